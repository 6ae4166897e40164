//! C1 — KeyValue Store Adapter.
//!
//! A thin interface over a Redis-compatible store, generalized only as far
//! as the Lock Engine (C2) and Dependency Graph Builder (C4) need: simple
//! string/hash primitives for metadata, plus a small number of
//! domain-shaped operations that must execute as a single atomic
//! server-side script (lock acquire/release/sweep, graph persistence).
//! Every implementation — the Redis-backed one and the in-memory fake used
//! in tests — must give those operations the same atomicity guarantee.

pub mod memory_store;
pub mod redis_store;

use crate::error::Result;
use crate::types::{FileShaMap, LockEntry};
use async_trait::async_trait;
use std::collections::HashMap;

pub use memory_store::InMemoryStore;
pub use redis_store::RedisStore;

/// A file the caller wants to acquire, carrying the fields that become
/// part of the installed `LockEntry` on success.
#[derive(Debug, Clone)]
pub struct LockAcquireRequest<'a> {
    pub lock_key: &'a str,
    pub files: &'a [String],
    pub user_id: &'a str,
    pub user_name: &'a str,
    pub status: crate::types::LockStatus,
    pub message: &'a str,
    pub agent_head: &'a str,
    pub now_ms: i64,
    pub ttl_ms: i64,
    /// Whether a `READING` request should conflict with an existing
    /// `READING` entry from a different owner. Resolved per the project's
    /// decision on the reader-locking open question (DESIGN.md): `false`.
    pub reading_conflicts_with_reading: bool,
}

#[derive(Debug, Clone)]
pub enum LockAcquireOutcome {
    Installed(Vec<LockEntry>),
    Conflict {
        conflicting_file: String,
        conflicting_user: String,
    },
}

/// The structural graph blob plus the incremental `FileShaMap` and
/// `ContentCache` deltas, written together so a reader never observes one
/// without the other (§5 "Graph reads are linearizable with respect to
/// graph writes").
#[derive(Debug, Clone)]
pub struct GraphWrite<'a> {
    pub blob_json: &'a str,
    pub version: &'a str,
    pub sha_upserts: &'a [(String, String)],
    pub sha_deletes: &'a [String],
    /// `contentSha -> text` entries newly fetched during this build.
    pub content_upserts: &'a [(String, String)],
    /// `contentSha` values no longer referenced by any file after this
    /// build, evicted best-effort (§4.4 "Content caching").
    pub content_deletes: &'a [String],
}

#[async_trait]
pub trait KeyValueStore: Send + Sync + std::fmt::Debug {
    async fn get_string(&self, key: &str) -> Result<Option<String>>;
    async fn set_string(&self, key: &str, value: &str) -> Result<()>;
    async fn hash_get_all(&self, key: &str) -> Result<HashMap<String, String>>;
    async fn hash_get(&self, key: &str, field: &str) -> Result<Option<String>>;
    async fn delete(&self, key: &str) -> Result<()>;
    async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>>;

    /// Atomic check-then-commit acquire across every file in the request.
    /// Either every file gets a fresh entry or none do (Invariant 3).
    async fn acquire_locks(&self, req: &LockAcquireRequest<'_>) -> Result<LockAcquireOutcome>;

    /// Atomic owner-guarded delete. Files not owned by `user_id` are
    /// silently skipped (Invariant 2); the call always succeeds.
    async fn release_locks(&self, lock_key: &str, user_id: &str, files: &[String]) -> Result<()>;

    /// Unconditional wipe of the whole lock hash for administrative resets.
    /// Returns the number of entries removed.
    async fn release_all_locks(&self, lock_key: &str) -> Result<u64>;

    /// Walk every key under `lock_key_prefix`, dropping fields whose
    /// expiry has passed. Returns the number removed.
    async fn sweep_locks(&self, lock_key_prefix: &str, now_ms: i64) -> Result<u64>;

    /// Single pipelined write of the graph blob, version, `FileShaMap`
    /// delta, and `ContentCache` delta for one `(repo, branch)`.
    async fn persist_graph(
        &self,
        blob_key: &str,
        version_key: &str,
        sha_map_key: &str,
        content_key: &str,
        write: GraphWrite<'_>,
    ) -> Result<()>;

    /// Convenience read of the full `FileShaMap` for a `(repo, branch)`.
    async fn read_file_sha_map(&self, sha_map_key: &str) -> Result<FileShaMap> {
        self.hash_get_all(sha_map_key).await
    }
}
