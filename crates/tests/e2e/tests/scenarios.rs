//! Black-box coverage of the six end-to-end scenarios: solo acquire/release,
//! contention, a stale writer, atomic multi-file acquisition, TTL expiry via
//! the sweeper endpoint, and an incremental graph rebuild across a rename.

use agentlock_e2e::TestHarness;
use serde_json::json;

fn seed_repo(h: &TestHarness) {
    h.push_commit(
        "acme",
        "widgets",
        "main",
        "c1",
        vec![("a.ts", "sha-a1"), ("b.ts", "sha-b1")],
        vec![("a.ts", "export const a = 1;\n"), ("b.ts", "export const b = 1;\n")],
    );
}

#[tokio::test]
async fn solo_writing_acquire_then_release() {
    let h = TestHarness::new(60_000, "shh");
    seed_repo(&h);

    let (status, body) = h
        .post(
            "/api/post_status",
            json!({
                "repo_url": "acme/widgets",
                "branch": "main",
                "file_paths": ["a.ts"],
                "status": "WRITING",
                "message": "editing a.ts",
                "user_id": "agent-1",
                "user_name": "Agent One",
                "agent_head": "c1",
            }),
        )
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["success"], json!(true));
    assert_eq!(body["locks"][0]["file_path"], json!("a.ts"));

    let (status, body) = h
        .post(
            "/api/check_status",
            json!({
                "repo_url": "acme/widgets",
                "branch": "main",
                "file_paths": ["a.ts"],
                "agent_head": "c1",
            }),
        )
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["status"], json!("CONFLICT"));

    let (status, body) = h
        .post(
            "/api/post_status",
            json!({
                "repo_url": "acme/widgets",
                "branch": "main",
                "file_paths": ["a.ts"],
                "status": "OPEN",
                "message": "done",
                "user_id": "agent-1",
                "user_name": "Agent One",
            }),
        )
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["success"], json!(true));

    let (_, body) = h
        .post(
            "/api/check_status",
            json!({
                "repo_url": "acme/widgets",
                "branch": "main",
                "file_paths": ["a.ts"],
                "agent_head": "c1",
            }),
        )
        .await;
    assert_eq!(body["status"], json!("OK"));
}

#[tokio::test]
async fn contention_between_two_agents() {
    let h = TestHarness::new(60_000, "shh");
    seed_repo(&h);

    let acquire = |user: &'static str| {
        json!({
            "repo_url": "acme/widgets",
            "branch": "main",
            "file_paths": ["a.ts"],
            "status": "WRITING",
            "message": "editing a.ts",
            "user_id": user,
            "user_name": user,
            "agent_head": "c1",
        })
    };

    let (status, body) = h.post("/api/post_status", acquire("agent-1")).await;
    assert_eq!(status, 200);
    assert_eq!(body["success"], json!(true));

    let (status, body) = h.post("/api/post_status", acquire("agent-2")).await;
    assert_eq!(status, 200);
    assert_eq!(body["success"], json!(false));
    assert_eq!(body["orchestration"]["action"], json!("SWITCH_TASK"));
}

#[tokio::test]
async fn stale_writer_is_redirected_to_pull() {
    let h = TestHarness::new(60_000, "shh");
    seed_repo(&h);
    h.push_commit(
        "acme",
        "widgets",
        "main",
        "c2",
        vec![("a.ts", "sha-a2"), ("b.ts", "sha-b1")],
        vec![("a.ts", "export const a = 2;\n"), ("b.ts", "export const b = 1;\n")],
    );

    let (status, body) = h
        .post(
            "/api/post_status",
            json!({
                "repo_url": "acme/widgets",
                "branch": "main",
                "file_paths": ["a.ts"],
                "status": "WRITING",
                "message": "editing a.ts",
                "user_id": "agent-1",
                "user_name": "Agent One",
                "agent_head": "c1",
            }),
        )
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["success"], json!(false));
    assert_eq!(body["orchestration"]["action"], json!("PULL"));
    assert_eq!(body["orchestration"]["metadata"]["remote_head"], json!("c2"));
}

#[tokio::test]
async fn atomic_multi_file_acquire_is_all_or_nothing() {
    let h = TestHarness::new(60_000, "shh");
    seed_repo(&h);

    let (status, body) = h
        .post(
            "/api/post_status",
            json!({
                "repo_url": "acme/widgets",
                "branch": "main",
                "file_paths": ["b.ts"],
                "status": "WRITING",
                "message": "editing b.ts",
                "user_id": "agent-2",
                "user_name": "Agent Two",
                "agent_head": "c1",
            }),
        )
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["success"], json!(true));

    let (status, body) = h
        .post(
            "/api/post_status",
            json!({
                "repo_url": "acme/widgets",
                "branch": "main",
                "file_paths": ["a.ts", "b.ts"],
                "status": "WRITING",
                "message": "editing both",
                "user_id": "agent-1",
                "user_name": "Agent One",
                "agent_head": "c1",
            }),
        )
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["success"], json!(false));

    let (_, body) = h
        .post(
            "/api/check_status",
            json!({
                "repo_url": "acme/widgets",
                "branch": "main",
                "file_paths": ["a.ts"],
                "agent_head": "c1",
            }),
        )
        .await;
    assert_eq!(body["status"], json!("OK"), "a.ts must not be left locked by the rolled-back acquire");
}

#[tokio::test]
async fn expired_lock_is_swept_on_demand() {
    let h = TestHarness::new(50, "sweep-secret");
    seed_repo(&h);

    let (status, body) = h
        .post(
            "/api/post_status",
            json!({
                "repo_url": "acme/widgets",
                "branch": "main",
                "file_paths": ["a.ts"],
                "status": "WRITING",
                "message": "editing a.ts",
                "user_id": "agent-1",
                "user_name": "Agent One",
                "agent_head": "c1",
            }),
        )
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["success"], json!(true));

    tokio::time::sleep(std::time::Duration::from_millis(150)).await;

    let (status, body) = h
        .post("/api/cleanup_stale_locks", json!({"shared_secret": "sweep-secret"}))
        .await;
    assert_eq!(status, 200);
    assert!(body["cleaned"].as_u64().unwrap() >= 1);

    let (_, body) = h
        .post(
            "/api/check_status",
            json!({
                "repo_url": "acme/widgets",
                "branch": "main",
                "file_paths": ["a.ts"],
                "agent_head": "c1",
            }),
        )
        .await;
    assert_eq!(body["status"], json!("OK"));
}

#[tokio::test]
async fn cleanup_stale_locks_rejects_wrong_secret() {
    let h = TestHarness::new(60_000, "sweep-secret");
    let (status, _) = h
        .post("/api/cleanup_stale_locks", json!({"shared_secret": "wrong"}))
        .await;
    assert_eq!(status, 401);
}

#[tokio::test]
async fn incremental_graph_rebuild_follows_a_rename() {
    let h = TestHarness::new(60_000, "shh");
    h.push_commit(
        "acme",
        "widgets",
        "main",
        "c1",
        vec![("a.ts", "sha-a1"), ("b.ts", "sha-b1")],
        vec![
            ("a.ts", "import { b } from \"./b\";\n"),
            ("b.ts", "export const b = 1;\n"),
        ],
    );

    let (status, body) = h
        .post("/api/get_graph", json!({"repo_url": "acme/widgets", "branch": "main"}))
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["version"], json!("c1"));
    assert_eq!(body["edges"].as_array().unwrap().len(), 1);
    assert_eq!(body["edges"][0]["target"], json!("b.ts"));

    h.push_commit(
        "acme",
        "widgets",
        "main",
        "c2",
        vec![("a.ts", "sha-a2"), ("c.ts", "sha-b1")],
        vec![
            ("a.ts", "import { c } from \"./c\";\n"),
            ("c.ts", "export const b = 1;\n"),
        ],
    );

    let (status, body) = h
        .post("/api/get_graph", json!({"repo_url": "acme/widgets", "branch": "main"}))
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["version"], json!("c2"));
    let ids: Vec<&str> = body["nodes"]
        .as_array()
        .unwrap()
        .iter()
        .map(|n| n["id"].as_str().unwrap())
        .collect();
    assert!(ids.contains(&"c.ts"));
    assert!(!ids.contains(&"b.ts"));
    assert_eq!(body["edges"][0]["target"], json!("c.ts"));
}
