//! C2 — Lock Engine. Validates requests, derives the composite key per
//! `(repo, branch)`, and delegates the atomic check-then-commit protocol to
//! C1. This layer owns no mutable state of its own — every durable mutation
//! passes through the key-value store (§5 "Shared-resource policy").

use crate::error::{Error, Result};
use crate::kv::{KeyValueStore, LockAcquireOutcome, LockAcquireRequest};
use crate::types::{LockEntry, LockStatus};
use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::Arc;

/// Whether a `READING` acquire conflicts with an existing `READING` entry
/// from a different owner. The reference behaviour is ambiguous here
/// (§9 "Reader locking semantics — open question"); this codebase resolves
/// it as `false` — concurrent readers are not modeled as conflicting with
/// each other — recorded in DESIGN.md.
pub const READING_CONFLICTS_WITH_READING: bool = false;

pub struct LockEngine {
    kv: Arc<dyn KeyValueStore>,
}

pub struct AcquireRequest {
    pub repo: String,
    pub branch: String,
    pub file_paths: Vec<String>,
    pub user_id: String,
    pub user_name: String,
    pub status: LockStatus,
    pub message: String,
    pub agent_head: String,
}

pub enum AcquireResult {
    Installed(Vec<LockEntry>),
    Conflict {
        conflicting_file: String,
        conflicting_user: String,
    },
}

impl LockEngine {
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self { kv }
    }

    pub fn lock_key(repo: &str, branch: &str) -> String {
        format!("locks:{repo}:{branch}")
    }

    /// `acquire(request)` per §4.2. Deduplicates `filePaths`, validates
    /// `message` is non-empty, and executes the atomic acquire.
    pub async fn acquire(&self, req: AcquireRequest, now_ms: i64, ttl_ms: i64) -> Result<AcquireResult> {
        if req.file_paths.is_empty() {
            return Err(Error::validation("file_paths must not be empty"));
        }
        if req.message.trim().is_empty() {
            return Err(Error::validation("message must not be empty"));
        }

        let mut seen = HashSet::new();
        let dedup: Vec<String> = req
            .file_paths
            .into_iter()
            .filter(|f| seen.insert(f.clone()))
            .collect();

        let lock_key = Self::lock_key(&req.repo, &req.branch);
        let kv_req = LockAcquireRequest {
            lock_key: &lock_key,
            files: &dedup,
            user_id: &req.user_id,
            user_name: &req.user_name,
            status: req.status,
            message: &req.message,
            agent_head: &req.agent_head,
            now_ms,
            ttl_ms,
            reading_conflicts_with_reading: READING_CONFLICTS_WITH_READING,
        };

        match self.kv.acquire_locks(&kv_req).await? {
            LockAcquireOutcome::Installed(entries) => Ok(AcquireResult::Installed(entries)),
            LockAcquireOutcome::Conflict {
                conflicting_file,
                conflicting_user,
            } => Ok(AcquireResult::Conflict {
                conflicting_file,
                conflicting_user,
            }),
        }
    }

    /// `release(repo, branch, filePaths, userId)` per §4.2. Always
    /// succeeds; non-owned files are silently skipped (Invariant 2).
    pub async fn release(
        &self,
        repo: &str,
        branch: &str,
        file_paths: &[String],
        user_id: &str,
    ) -> Result<()> {
        let lock_key = Self::lock_key(repo, branch);
        self.kv.release_locks(&lock_key, user_id, file_paths).await
    }

    /// `releaseAll(repo, branch)` — unconditional wipe, for administrative
    /// resets.
    pub async fn release_all(&self, repo: &str, branch: &str) -> Result<u64> {
        let lock_key = Self::lock_key(repo, branch);
        self.kv.release_all_locks(&lock_key).await
    }

    /// `getAll(repo, branch)` per §4.2: read the mapping, drop entries
    /// that fail to parse (treated as absent) or have expired
    /// (Invariant 4 — no expired entry is ever returned to a caller).
    pub async fn get_all(&self, repo: &str, branch: &str, now_ms: i64) -> Result<HashMap<String, LockEntry>> {
        let lock_key = Self::lock_key(repo, branch);
        let raw = self.kv.hash_get_all(&lock_key).await?;
        let mut out = HashMap::with_capacity(raw.len());
        for (path, value) in raw {
            match serde_json::from_str::<LockEntry>(&value) {
                Ok(entry) if !entry.is_expired(now_ms) => {
                    out.insert(path, entry);
                }
                Ok(_) => {} // expired: semantically absent
                Err(e) => {
                    tracing::warn!(key = %lock_key, path = %path, error = %e, "dropping corrupt lock entry");
                }
            }
        }
        Ok(out)
    }

    /// `check(repo, branch, filePaths)` — `getAll` restricted to the
    /// requested paths.
    pub async fn check(
        &self,
        repo: &str,
        branch: &str,
        file_paths: &[String],
        now_ms: i64,
    ) -> Result<HashMap<String, LockEntry>> {
        let all = self.get_all(repo, branch, now_ms).await?;
        Ok(all
            .into_iter()
            .filter(|(path, _)| file_paths.contains(path))
            .collect())
    }

    /// `sweep()` — used by the Stale-Lock Sweeper. Enumerates every lock
    /// key and removes expired entries across all repos/branches.
    pub async fn sweep(&self, now_ms: i64) -> Result<u64> {
        self.kv.sweep_locks("locks:", now_ms).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::InMemoryStore;

    fn engine() -> LockEngine {
        LockEngine::new(Arc::new(InMemoryStore::new()))
    }

    fn acquire_req(files: &[&str], user: &str, status: LockStatus) -> AcquireRequest {
        AcquireRequest {
            repo: "r".into(),
            branch: "main".into(),
            file_paths: files.iter().map(|s| s.to_string()).collect(),
            user_id: user.into(),
            user_name: user.into(),
            status,
            message: "working on it".into(),
            agent_head: "h1".into(),
        }
    }

    #[tokio::test]
    async fn empty_file_paths_is_validation_error() {
        let engine = engine();
        let req = acquire_req(&[], "alice", LockStatus::Writing);
        let err = engine.acquire(req, 0, 300_000).await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[tokio::test]
    async fn acquire_release_acquire_round_trip_succeeds() {
        let engine = engine();
        let req = acquire_req(&["a.ts"], "alice", LockStatus::Writing);
        assert!(matches!(
            engine.acquire(req, 0, 300_000).await.unwrap(),
            AcquireResult::Installed(_)
        ));

        engine
            .release("r", "main", &["a.ts".to_string()], "alice")
            .await
            .unwrap();

        let req2 = acquire_req(&["a.ts"], "alice", LockStatus::Writing);
        assert!(matches!(
            engine.acquire(req2, 1, 300_000).await.unwrap(),
            AcquireResult::Installed(_)
        ));
    }

    #[tokio::test]
    async fn same_owner_reacquire_refreshes_ttl() {
        let engine = engine();
        let req = acquire_req(&["a.ts"], "alice", LockStatus::Writing);
        engine.acquire(req, 0, 300_000).await.unwrap();

        let req2 = acquire_req(&["a.ts"], "alice", LockStatus::Writing);
        let result = engine.acquire(req2, 100, 300_000).await.unwrap();
        match result {
            AcquireResult::Installed(entries) => assert_eq!(entries[0].timestamp, 100),
            AcquireResult::Conflict { .. } => panic!("same owner reacquire must not conflict"),
        }
    }

    #[tokio::test]
    async fn expired_lock_is_absent_from_reads() {
        let engine = engine();
        let req = acquire_req(&["a.ts"], "alice", LockStatus::Writing);
        engine.acquire(req, 0, 300_000).await.unwrap();

        let locks = engine.get_all("r", "main", 300_001).await.unwrap();
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn concurrent_readers_do_not_conflict() {
        let engine = engine();
        let req = acquire_req(&["a.ts"], "alice", LockStatus::Reading);
        engine.acquire(req, 0, 300_000).await.unwrap();

        let req2 = acquire_req(&["a.ts"], "bob", LockStatus::Reading);
        let result = engine.acquire(req2, 1, 300_000).await.unwrap();
        assert!(matches!(result, AcquireResult::Installed(_)));
    }
}
