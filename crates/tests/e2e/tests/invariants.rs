//! Property-based checks of invariants that must hold for arbitrary file
//! sets and agents, not just the handful exercised in `scenarios.rs`.

use agentlock_e2e::TestHarness;
use proptest::collection::hash_set;
use proptest::prelude::*;
use serde_json::json;
use std::collections::HashSet;

fn file_name() -> impl Strategy<Value = String> {
    "[a-z]{1,8}\\.ts".prop_map(|s| s)
}

fn distinct_files(max: usize) -> impl Strategy<Value = Vec<String>> {
    hash_set(file_name(), 1..=max).prop_map(|set: HashSet<String>| set.into_iter().collect())
}

async fn seeded_harness(files: &[String]) -> TestHarness {
    let h = TestHarness::new(60_000, "shh");
    let tree: Vec<(&str, &str)> = files.iter().map(|f| (f.as_str(), "sha-1")).collect();
    let contents: Vec<(&str, &str)> = files.iter().map(|f| (f.as_str(), "export const x = 1;\n")).collect();
    h.push_commit("acme", "widgets", "main", "c1", tree, contents);
    h
}

proptest! {
    /// Acquiring WRITING on a set of files and then releasing them with
    /// OPEN always leaves every file checkable as OK again, whatever the
    /// file set looks like.
    #[test]
    fn writing_then_open_round_trips_to_ok(files in distinct_files(6)) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let h = seeded_harness(&files).await;

            let (status, body) = h.post("/api/post_status", json!({
                "repo_url": "acme/widgets",
                "branch": "main",
                "file_paths": files,
                "status": "WRITING",
                "message": "writing",
                "user_id": "agent-1",
                "user_name": "Agent One",
                "agent_head": "c1",
            })).await;
            prop_assert_eq!(status, 200);
            prop_assert_eq!(body["success"], json!(true));

            let (_, body) = h.post("/api/post_status", json!({
                "repo_url": "acme/widgets",
                "branch": "main",
                "file_paths": files,
                "status": "OPEN",
                "message": "done",
                "user_id": "agent-1",
                "user_name": "Agent One",
            })).await;
            prop_assert_eq!(body["success"], json!(true));

            for file in &files {
                let (_, body) = h.post("/api/check_status", json!({
                    "repo_url": "acme/widgets",
                    "branch": "main",
                    "file_paths": [file],
                    "agent_head": "c1",
                })).await;
                prop_assert_eq!(body["status"].clone(), json!("OK"));
            }
            Ok(())
        })?;
    }

    /// Two agents with disjoint file sets never conflict with each other,
    /// regardless of how the sets are partitioned.
    #[test]
    fn disjoint_file_sets_never_conflict(files in distinct_files(8)) {
        prop_assume!(files.len() >= 2);
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let h = seeded_harness(&files).await;
            let mid = files.len() / 2;
            let (left, right) = files.split_at(mid.max(1));
            let left = left.to_vec();
            let right = right.to_vec();
            if right.is_empty() {
                return Ok(());
            }

            let (_, body_left) = h.post("/api/post_status", json!({
                "repo_url": "acme/widgets",
                "branch": "main",
                "file_paths": left,
                "status": "WRITING",
                "message": "writing left half",
                "user_id": "agent-left",
                "user_name": "Agent Left",
                "agent_head": "c1",
            })).await;
            prop_assert_eq!(body_left["success"], json!(true));

            let (_, body_right) = h.post("/api/post_status", json!({
                "repo_url": "acme/widgets",
                "branch": "main",
                "file_paths": right,
                "status": "WRITING",
                "message": "writing right half",
                "user_id": "agent-right",
                "user_name": "Agent Right",
                "agent_head": "c1",
            })).await;
            prop_assert_eq!(body_right["success"], json!(true));
            Ok(())
        })?;
    }

    /// A WRITING acquire against a stale `agent_head` is always redirected
    /// to PULL and never installs a lock, no matter which files are named.
    #[test]
    fn stale_head_never_installs_a_lock(files in distinct_files(4)) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let h = seeded_harness(&files).await;
            let tree: Vec<(&str, &str)> = files.iter().map(|f| (f.as_str(), "sha-2")).collect();
            let contents: Vec<(&str, &str)> = files.iter().map(|f| (f.as_str(), "export const x = 2;\n")).collect();
            h.push_commit("acme", "widgets", "main", "c2", tree, contents);

            let (_, body) = h.post("/api/post_status", json!({
                "repo_url": "acme/widgets",
                "branch": "main",
                "file_paths": files,
                "status": "WRITING",
                "message": "writing on stale head",
                "user_id": "agent-1",
                "user_name": "Agent One",
                "agent_head": "c1",
            })).await;
            prop_assert_eq!(body["success"], json!(false));
            prop_assert_eq!(body["orchestration"]["action"].clone(), json!("PULL"));
            prop_assert!(body.get("locks").is_none() || body["locks"].is_null());
            Ok(())
        })?;
    }
}
