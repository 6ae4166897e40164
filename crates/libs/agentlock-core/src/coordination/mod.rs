//! C5 — Coordination API. Composes the Lock Engine (C2), Remote Repository
//! Adapter (C3), and Dependency Graph Builder (C4) into the three
//! orchestration operations of §4.5, plus the two administrative
//! operations of §6 (`release_all_locks`, `cleanup_stale_locks`).

use crate::error::{Error, Result};
use crate::graph::GraphBuilder;
use crate::kv::KeyValueStore;
use crate::lock::{AcquireRequest, AcquireResult, LockEngine};
use crate::remote::RemoteRepository;
use crate::types::{
    ActivityEvent, DependencyGraph, DependencyGraphBlob, LockEntry, LockStatus, OrchestrationCommand,
};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CheckStatusKind {
    Stale,
    Conflict,
    Ok,
}

#[derive(Debug, Clone, Copy)]
pub struct CheckStatusRequest<'a> {
    pub owner: &'a str,
    pub repo_name: &'a str,
    pub branch: &'a str,
    pub file_paths: &'a [String],
    pub agent_head: &'a str,
}

#[derive(Debug, Clone)]
pub struct CheckStatusResult {
    pub status: CheckStatusKind,
    pub remote_head: String,
    pub locks: HashMap<String, LockEntry>,
    pub warnings: Vec<String>,
    pub orchestration: OrchestrationCommand,
}

#[derive(Debug, Clone, Copy)]
pub struct PostStatusRequest<'a> {
    pub owner: &'a str,
    pub repo_name: &'a str,
    pub branch: &'a str,
    pub file_paths: &'a [String],
    pub status: &'a str,
    pub message: &'a str,
    pub user_id: &'a str,
    pub user_name: &'a str,
    pub agent_head: Option<&'a str>,
    pub new_repo_head: Option<&'a str>,
}

#[derive(Debug, Clone)]
pub struct PostStatusResult {
    pub orchestration: OrchestrationCommand,
    pub locks: Option<Vec<LockEntry>>,
    pub orphaned_dependencies: Vec<String>,
    pub activity_events: Vec<ActivityEvent>,
}

pub struct CoordinationApi {
    lock_engine: LockEngine,
    graph_builder: GraphBuilder,
    remote: Arc<dyn RemoteRepository>,
    kv: Arc<dyn KeyValueStore>,
    head_check_min_interval_ms: i64,
}

impl CoordinationApi {
    pub fn new(kv: Arc<dyn KeyValueStore>, remote: Arc<dyn RemoteRepository>, head_check_min_interval_ms: i64) -> Self {
        Self {
            lock_engine: LockEngine::new(kv.clone()),
            graph_builder: GraphBuilder::new(kv.clone(), remote.clone(), head_check_min_interval_ms),
            remote,
            kv,
            head_check_min_interval_ms,
        }
    }

    /// `check_status(repo, branch, filePaths, agentHead)` per §4.5.
    pub async fn check_status(&self, req: CheckStatusRequest<'_>, now_ms: i64) -> Result<CheckStatusResult> {
        if req.file_paths.is_empty() {
            return Err(Error::validation("file_paths must not be empty"));
        }

        let repo = format!("{}/{}", req.owner, req.repo_name);
        let remote_head = self
            .remote
            .get_head_cached(req.owner, req.repo_name, req.branch, self.head_check_min_interval_ms)
            .await?;
        let is_stale = req.agent_head != remote_head;
        let locks = self.lock_engine.check(&repo, req.branch, req.file_paths, now_ms).await?;

        let status = if is_stale {
            CheckStatusKind::Stale
        } else if !locks.is_empty() {
            CheckStatusKind::Conflict
        } else {
            CheckStatusKind::Ok
        };

        let mut warnings = Vec::new();
        let orchestration = if is_stale {
            OrchestrationCommand::pull(
                format!("Your local repo is behind. Current HEAD: {remote_head}"),
                &remote_head,
                req.agent_head,
            )
        } else if let Some((file, entry)) = req
            .file_paths
            .iter()
            .find_map(|f| locks.get(f).map(|entry| (f.clone(), entry.clone())))
        {
            OrchestrationCommand::switch_task(format!(
                "{file} is locked by {} (kind=DIRECT)",
                entry.user_name
            ))
        } else {
            match self.find_neighbor_lock(&repo, req.branch, req.file_paths, now_ms).await {
                Ok(Some((file, entry))) => OrchestrationCommand::switch_task(format!(
                    "{file} is locked by {} (kind=NEIGHBOR)",
                    entry.user_name
                )),
                Ok(None) => OrchestrationCommand::proceed("no conflicting locks"),
                Err(e) => {
                    warnings.push(format!("neighbor lock check unavailable: {e}"));
                    OrchestrationCommand::proceed("no conflicting locks")
                }
            }
        };

        Ok(CheckStatusResult {
            status,
            remote_head,
            locks,
            warnings,
            orchestration,
        })
    }

    /// `post_status(repo, branch, filePaths, status, message, agentHead?, newRepoHead?)`.
    pub async fn post_status(&self, req: PostStatusRequest<'_>, now_ms: i64, ttl_ms: i64) -> Result<PostStatusResult> {
        if req.file_paths.is_empty() {
            return Err(Error::validation("file_paths must not be empty"));
        }
        if req.message.trim().is_empty() {
            return Err(Error::validation("message must not be empty"));
        }

        let repo = format!("{}/{}", req.owner, req.repo_name);
        match req.status.to_uppercase().as_str() {
            "OPEN" => self.post_status_open(&repo, req, now_ms).await,
            "WRITING" => self.post_status_writing(&repo, req, now_ms, ttl_ms).await,
            "READING" => self.post_status_reading(&repo, req, now_ms, ttl_ms).await,
            other => Ok(PostStatusResult {
                orchestration: OrchestrationCommand::proceed(format!("status '{other}' recorded")),
                locks: None,
                orphaned_dependencies: vec![],
                activity_events: req
                    .file_paths
                    .iter()
                    .map(|f| activity_event(req, &format!("status_{}", other.to_lowercase()), f.clone(), now_ms))
                    .collect(),
            }),
        }
    }

    async fn post_status_open(
        &self,
        repo: &str,
        req: PostStatusRequest<'_>,
        now_ms: i64,
    ) -> Result<PostStatusResult> {
        if let (Some(new_head), Some(agent_head)) = (req.new_repo_head, req.agent_head) {
            if new_head == agent_head {
                return Ok(PostStatusResult {
                    orchestration: OrchestrationCommand::push(
                        "You asserted completion without advancing the branch; push your changes first.",
                    ),
                    locks: None,
                    orphaned_dependencies: vec![],
                    activity_events: vec![],
                });
            }
        }

        self.lock_engine
            .release(repo, req.branch, req.file_paths, req.user_id)
            .await?;

        let orphaned_dependencies = self
            .compute_orphaned_dependencies(repo, req.branch, req.file_paths)
            .await;

        let activity_events = req
            .file_paths
            .iter()
            .map(|f| activity_event(req, "status_open", f.clone(), now_ms))
            .collect();

        Ok(PostStatusResult {
            orchestration: OrchestrationCommand::proceed("locks released"),
            locks: None,
            orphaned_dependencies,
            activity_events,
        })
    }

    async fn post_status_writing(
        &self,
        repo: &str,
        req: PostStatusRequest<'_>,
        now_ms: i64,
        ttl_ms: i64,
    ) -> Result<PostStatusResult> {
        let Some(agent_head) = req.agent_head else {
            return Err(Error::validation("agent_head is required for WRITING"));
        };

        let remote_head = self
            .remote
            .get_head_cached(req.owner, req.repo_name, req.branch, self.head_check_min_interval_ms)
            .await?;
        if agent_head != remote_head {
            return Ok(PostStatusResult {
                orchestration: OrchestrationCommand::pull(
                    format!("Your local repo is behind. Current HEAD: {remote_head}"),
                    &remote_head,
                    agent_head,
                ),
                locks: None,
                orphaned_dependencies: vec![],
                activity_events: vec![],
            });
        }

        self.acquire_and_respond(repo, req, LockStatus::Writing, agent_head.to_string(), "status_writing", now_ms, ttl_ms)
            .await
    }

    async fn post_status_reading(
        &self,
        repo: &str,
        req: PostStatusRequest<'_>,
        now_ms: i64,
        ttl_ms: i64,
    ) -> Result<PostStatusResult> {
        let agent_head = match req.agent_head {
            Some(h) => h.to_string(),
            None => {
                self.remote
                    .get_head_cached(req.owner, req.repo_name, req.branch, self.head_check_min_interval_ms)
                    .await?
            }
        };

        self.acquire_and_respond(repo, req, LockStatus::Reading, agent_head, "status_reading", now_ms, ttl_ms)
            .await
    }

    async fn acquire_and_respond(
        &self,
        repo: &str,
        req: PostStatusRequest<'_>,
        status: LockStatus,
        agent_head: String,
        event_type: &str,
        now_ms: i64,
        ttl_ms: i64,
    ) -> Result<PostStatusResult> {
        let acquire_req = AcquireRequest {
            repo: repo.to_string(),
            branch: req.branch.to_string(),
            file_paths: req.file_paths.to_vec(),
            user_id: req.user_id.to_string(),
            user_name: req.user_name.to_string(),
            status,
            message: req.message.to_string(),
            agent_head,
        };

        match self.lock_engine.acquire(acquire_req, now_ms, ttl_ms).await? {
            AcquireResult::Conflict {
                conflicting_file,
                conflicting_user,
            } => Ok(PostStatusResult {
                orchestration: OrchestrationCommand::switch_task(format!(
                    "{conflicting_file} is locked by {conflicting_user}"
                )),
                locks: None,
                orphaned_dependencies: vec![],
                activity_events: vec![],
            }),
            AcquireResult::Installed(entries) => {
                let activity_events = entries
                    .iter()
                    .map(|e| activity_event(req, event_type, e.file_path.clone(), now_ms))
                    .collect();
                Ok(PostStatusResult {
                    orchestration: OrchestrationCommand::proceed("locks acquired"),
                    locks: Some(entries),
                    orphaned_dependencies: vec![],
                    activity_events,
                })
            }
        }
    }

    /// `get_graph(repo, branch, forceRegenerate?)`. Delegates to C4 (which
    /// owns its own single-flight), then overlays fresh locks from C2 —
    /// never from the persisted structural blob (§4.4 "Output at read time").
    pub async fn get_graph(
        &self,
        owner: &str,
        repo_name: &str,
        branch: &str,
        force_regenerate: bool,
        now_ms: i64,
    ) -> Result<DependencyGraph> {
        let repo = format!("{owner}/{repo_name}");
        let build = self
            .graph_builder
            .get_graph(owner, repo_name, branch, force_regenerate, now_ms)
            .await?;
        let locks = self.lock_engine.get_all(&repo, branch, now_ms).await?;
        Ok(build.blob.with_locks(build.version, locks))
    }

    pub async fn release_all_locks(&self, owner: &str, repo_name: &str, branch: &str) -> Result<u64> {
        let repo = format!("{owner}/{repo_name}");
        self.lock_engine.release_all(&repo, branch).await
    }

    pub async fn cleanup_stale_locks(&self, now_ms: i64) -> Result<u64> {
        self.lock_engine.sweep(now_ms).await
    }

    /// Best-effort `NEIGHBOR` lock detection (§9 design notes): reads the
    /// cached graph blob directly, without triggering a C4 rebuild, and
    /// checks locks on files reachable by one edge from a requested file.
    async fn find_neighbor_lock(
        &self,
        repo: &str,
        branch: &str,
        file_paths: &[String],
        now_ms: i64,
    ) -> Result<Option<(String, LockEntry)>> {
        let Some(blob_json) = self.kv.get_string(&format!("graph:{repo}:{branch}")).await? else {
            return Ok(None);
        };
        let Ok(blob) = serde_json::from_str::<DependencyGraphBlob>(&blob_json) else {
            return Ok(None);
        };

        let requested: HashSet<&String> = file_paths.iter().collect();
        let mut neighbors: Vec<String> = Vec::new();
        for edge in &blob.edges {
            if requested.contains(&edge.source) && !requested.contains(&edge.target) {
                neighbors.push(edge.target.clone());
            } else if requested.contains(&edge.target) && !requested.contains(&edge.source) {
                neighbors.push(edge.source.clone());
            }
        }
        if neighbors.is_empty() {
            return Ok(None);
        }

        let locks = self.lock_engine.check(repo, branch, &neighbors, now_ms).await?;
        Ok(neighbors.into_iter().find_map(|f| locks.get(&f).map(|e| (f.clone(), e.clone()))))
    }

    /// "from the cached graph, any file `s` such that some released target
    /// `t` has an edge `s -> t` and `s` itself is not being released"
    /// (§4.5 `OPEN`). Best-effort: an unavailable or corrupt graph yields
    /// an empty list rather than an error.
    async fn compute_orphaned_dependencies(&self, repo: &str, branch: &str, released: &[String]) -> Vec<String> {
        let Ok(Some(blob_json)) = self.kv.get_string(&format!("graph:{repo}:{branch}")).await else {
            return vec![];
        };
        let Ok(blob) = serde_json::from_str::<DependencyGraphBlob>(&blob_json) else {
            return vec![];
        };

        let released_set: HashSet<&String> = released.iter().collect();
        let mut orphaned: HashSet<String> = HashSet::new();
        for edge in &blob.edges {
            if released_set.contains(&edge.target) && !released_set.contains(&edge.source) {
                orphaned.insert(edge.source.clone());
            }
        }
        let mut out: Vec<String> = orphaned.into_iter().collect();
        out.sort();
        out
    }
}

fn activity_event(req: PostStatusRequest<'_>, event_type: &str, file_path: String, timestamp: i64) -> ActivityEvent {
    ActivityEvent {
        event_type: event_type.to_string(),
        user_id: req.user_id.to_string(),
        user_name: req.user_name.to_string(),
        message: req.message.to_string(),
        timestamp,
        file_path,
        status: req.status.to_uppercase(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::InMemoryStore;
    use crate::remote::fake::{FakeCommit, FakeRemoteRepository};
    use crate::remote::TreeEntry;

    fn api() -> (CoordinationApi, Arc<FakeRemoteRepository>) {
        let kv: Arc<dyn KeyValueStore> = Arc::new(InMemoryStore::new());
        let remote = Arc::new(FakeRemoteRepository::new());
        (CoordinationApi::new(kv, remote.clone(), 20_000), remote)
    }

    fn check_req<'a>(file_paths: &'a [String], agent_head: &'a str) -> CheckStatusRequest<'a> {
        CheckStatusRequest {
            owner: "owner",
            repo_name: "repo",
            branch: "main",
            file_paths,
            agent_head,
        }
    }

    #[tokio::test]
    async fn check_status_reports_stale_when_head_mismatches() {
        let (api, remote) = api();
        remote.push_commit("owner", "repo", "main", FakeCommit { sha: "c1".into(), ..Default::default() });

        let files = vec!["a.ts".to_string()];
        let result = api.check_status(check_req(&files, "old-head"), 0).await.unwrap();
        assert_eq!(result.status, CheckStatusKind::Stale);
        assert_eq!(result.orchestration.action, crate::types::OrchestrationAction::Pull);
    }

    #[tokio::test]
    async fn check_status_reports_conflict_on_direct_lock() {
        let (api, remote) = api();
        remote.push_commit("owner", "repo", "main", FakeCommit { sha: "c1".into(), ..Default::default() });

        let files = vec!["a.ts".to_string()];
        let post_req = PostStatusRequest {
            owner: "owner",
            repo_name: "repo",
            branch: "main",
            file_paths: &files,
            status: "WRITING",
            message: "working".into(),
            user_id: "bob",
            user_name: "Bob",
            agent_head: Some("c1"),
            new_repo_head: None,
        };
        api.post_status(post_req, 0, 300_000).await.unwrap();

        let result = api.check_status(check_req(&files, "c1"), 1).await.unwrap();
        assert_eq!(result.status, CheckStatusKind::Conflict);
        assert_eq!(result.orchestration.action, crate::types::OrchestrationAction::SwitchTask);
    }

    #[tokio::test]
    async fn post_status_open_refuses_push_when_head_unchanged() {
        let (api, remote) = api();
        remote.push_commit("owner", "repo", "main", FakeCommit { sha: "c1".into(), ..Default::default() });

        let files = vec!["a.ts".to_string()];
        let req = PostStatusRequest {
            owner: "owner",
            repo_name: "repo",
            branch: "main",
            file_paths: &files,
            status: "OPEN",
            message: "done".into(),
            user_id: "alice",
            user_name: "Alice",
            agent_head: Some("c1"),
            new_repo_head: Some("c1"),
        };
        let result = api.post_status(req, 0, 300_000).await.unwrap();
        assert_eq!(result.orchestration.action, crate::types::OrchestrationAction::Push);
    }

    #[tokio::test]
    async fn post_status_writing_stale_returns_pull() {
        let (api, remote) = api();
        remote.push_commit("owner", "repo", "main", FakeCommit { sha: "c2".into(), ..Default::default() });

        let files = vec!["a.ts".to_string()];
        let req = PostStatusRequest {
            owner: "owner",
            repo_name: "repo",
            branch: "main",
            file_paths: &files,
            status: "WRITING",
            message: "working".into(),
            user_id: "alice",
            user_name: "Alice",
            agent_head: Some("stale-head"),
            new_repo_head: None,
        };
        let result = api.post_status(req, 0, 300_000).await.unwrap();
        assert_eq!(result.orchestration.action, crate::types::OrchestrationAction::Pull);
    }

    #[tokio::test]
    async fn get_graph_overlays_locks_onto_structural_graph() {
        let (api, remote) = api();
        let mut contents = HashMap::new();
        contents.insert("a.ts".to_string(), "export const a = 1;\n".to_string());
        remote.push_commit(
            "owner",
            "repo",
            "main",
            FakeCommit {
                sha: "c1".into(),
                tree: vec![TreeEntry { path: "a.ts".into(), sha: "sha-a1".into(), size: Some(1) }],
                contents,
            },
        );

        let files = vec!["a.ts".to_string()];
        let post_req = PostStatusRequest {
            owner: "owner",
            repo_name: "repo",
            branch: "main",
            file_paths: &files,
            status: "READING",
            message: "reading".into(),
            user_id: "alice",
            user_name: "Alice",
            agent_head: None,
            new_repo_head: None,
        };
        api.post_status(post_req, 0, 300_000).await.unwrap();

        let graph = api.get_graph("owner", "repo", "main", false, 1).await.unwrap();
        assert!(graph.locks.contains_key("a.ts"));
        assert_eq!(graph.locks["a.ts"].user_id, "alice");
    }
}
