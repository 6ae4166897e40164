//! Builds the full axum router over in-memory/fake adapters and drives it
//! with `tower::ServiceExt::oneshot`, the way this codebase's own
//! `crates/tests/e2e` exercises its HTTP surface.

use agentlock_core::kv::{InMemoryStore, KeyValueStore};
use agentlock_core::remote::fake::{FakeCommit, FakeRemoteRepository};
use agentlock_core::remote::{RemoteRepository, TreeEntry};
use agentlock_server::AppState;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tower::ServiceExt;

pub struct TestHarness {
    app: Router,
    pub remote: Arc<FakeRemoteRepository>,
}

impl TestHarness {
    /// `ttl_ms` is exposed so TTL-boundary scenarios can use a short TTL
    /// and a real sleep instead of mocking the wall clock.
    pub fn new(ttl_ms: i64, shared_secret: &str) -> Self {
        let kv: Arc<dyn KeyValueStore> = Arc::new(InMemoryStore::new());
        let remote = Arc::new(FakeRemoteRepository::new());
        let remote_dyn: Arc<dyn RemoteRepository> = remote.clone();

        let api = Arc::new(agentlock_core::coordination::CoordinationApi::new(
            kv,
            remote_dyn,
            20_000,
        ));

        let state = AppState {
            api,
            sweeper_shared_secret: shared_secret.to_string(),
            default_ttl_ms: ttl_ms,
            metrics_handle: test_metrics_handle(),
            start_time: Instant::now(),
        };

        Self {
            app: agentlock_server::router(state),
            remote,
        }
    }

    pub fn push_commit(&self, owner: &str, repo: &str, branch: &str, sha: &str, tree: Vec<(&str, &str)>, contents: Vec<(&str, &str)>) {
        let tree = tree
            .into_iter()
            .map(|(path, sha)| TreeEntry {
                path: path.to_string(),
                sha: sha.to_string(),
                size: Some(1),
            })
            .collect();
        let contents: HashMap<String, String> = contents
            .into_iter()
            .map(|(path, text)| (path.to_string(), text.to_string()))
            .collect();
        self.remote.push_commit(owner, repo, branch, FakeCommit { sha: sha.to_string(), tree, contents });
    }

    pub async fn post(&self, path: &str, body: Value) -> (StatusCode, Value) {
        let request = Request::builder()
            .method("POST")
            .uri(path)
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(&body).expect("serialize request body")))
            .expect("build request");

        let response = self.app.clone().oneshot(request).await.expect("router call");
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("read response body");
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).expect("parse response JSON")
        };
        (status, value)
    }
}

fn test_metrics_handle() -> metrics_exporter_prometheus::PrometheusHandle {
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .build_recorder()
        .handle()
}
