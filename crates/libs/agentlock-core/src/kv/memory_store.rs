//! In-memory [`KeyValueStore`] fake for unit and property tests. Mirrors
//! the Redis adapter's atomicity guarantees with a single process-level
//! mutex instead of a scripted transaction — acceptable because tests run
//! single-process, and it lets C2/C4/C5 be exercised without a live Redis.

use super::{GraphWrite, KeyValueStore, LockAcquireOutcome, LockAcquireRequest};
use crate::error::Result;
use crate::types::{FileShaMap, LockEntry};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::Mutex;

#[derive(Debug, Default)]
struct State {
    strings: HashMap<String, String>,
    hashes: HashMap<String, HashMap<String, String>>,
}

#[derive(Debug, Default)]
pub struct InMemoryStore {
    state: Mutex<State>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for InMemoryStore {
    async fn get_string(&self, key: &str) -> Result<Option<String>> {
        Ok(self.state.lock().await.strings.get(key).cloned())
    }

    async fn set_string(&self, key: &str, value: &str) -> Result<()> {
        self.state
            .lock()
            .await
            .strings
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn hash_get_all(&self, key: &str) -> Result<HashMap<String, String>> {
        Ok(self.state.lock().await.hashes.get(key).cloned().unwrap_or_default())
    }

    async fn hash_get(&self, key: &str, field: &str) -> Result<Option<String>> {
        Ok(self
            .state
            .lock()
            .await
            .hashes
            .get(key)
            .and_then(|h| h.get(field))
            .cloned())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        state.strings.remove(key);
        state.hashes.remove(key);
        Ok(())
    }

    async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        let state = self.state.lock().await;
        Ok(state
            .hashes
            .keys()
            .chain(state.strings.keys())
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }

    async fn acquire_locks(&self, req: &LockAcquireRequest<'_>) -> Result<LockAcquireOutcome> {
        let mut state = self.state.lock().await;
        let hash = state.hashes.entry(req.lock_key.to_string()).or_default();

        // Check phase: either every file is acquirable, or we abort before
        // mutating anything (Invariant 3).
        for file in req.files {
            if let Some(existing) = hash.get(file) {
                if let Ok(entry) = serde_json::from_str::<LockEntry>(existing) {
                    let still_held = entry.expiry > req.now_ms && entry.user_id != req.user_id;
                    if still_held {
                        let shared_read = req.status == crate::types::LockStatus::Reading
                            && entry.status == crate::types::LockStatus::Reading
                            && !req.reading_conflicts_with_reading;
                        if !shared_read {
                            return Ok(LockAcquireOutcome::Conflict {
                                conflicting_file: file.clone(),
                                conflicting_user: entry.user_id,
                            });
                        }
                    }
                }
            }
        }

        // Commit phase.
        let mut installed = Vec::with_capacity(req.files.len());
        for file in req.files {
            let entry = LockEntry {
                file_path: file.clone(),
                user_id: req.user_id.to_string(),
                user_name: req.user_name.to_string(),
                status: req.status,
                agent_head: req.agent_head.to_string(),
                message: req.message.to_string(),
                timestamp: req.now_ms,
                expiry: req.now_ms + req.ttl_ms,
            };
            hash.insert(file.clone(), serde_json::to_string(&entry)?);
            installed.push(entry);
        }
        Ok(LockAcquireOutcome::Installed(installed))
    }

    async fn release_locks(&self, lock_key: &str, user_id: &str, files: &[String]) -> Result<()> {
        let mut state = self.state.lock().await;
        if let Some(hash) = state.hashes.get_mut(lock_key) {
            for file in files {
                let owned = hash
                    .get(file)
                    .and_then(|v| serde_json::from_str::<LockEntry>(v).ok())
                    .map(|e| e.user_id == user_id)
                    .unwrap_or(false);
                if owned {
                    hash.remove(file);
                }
            }
        }
        Ok(())
    }

    async fn release_all_locks(&self, lock_key: &str) -> Result<u64> {
        let mut state = self.state.lock().await;
        Ok(state.hashes.remove(lock_key).map(|h| h.len() as u64).unwrap_or(0))
    }

    async fn sweep_locks(&self, lock_key_prefix: &str, now_ms: i64) -> Result<u64> {
        let mut state = self.state.lock().await;
        let mut total = 0u64;
        for (key, hash) in state.hashes.iter_mut() {
            if !key.starts_with(lock_key_prefix) {
                continue;
            }
            let expired: Vec<String> = hash
                .iter()
                .filter(|(_, v)| {
                    serde_json::from_str::<LockEntry>(v)
                        .map(|e| e.expiry < now_ms)
                        .unwrap_or(true)
                })
                .map(|(k, _)| k.clone())
                .collect();
            for file in expired {
                hash.remove(&file);
                total += 1;
            }
        }
        Ok(total)
    }

    async fn persist_graph(
        &self,
        blob_key: &str,
        version_key: &str,
        sha_map_key: &str,
        content_key: &str,
        write: GraphWrite<'_>,
    ) -> Result<()> {
        let mut state = self.state.lock().await;
        state
            .strings
            .insert(blob_key.to_string(), write.blob_json.to_string());
        state
            .strings
            .insert(version_key.to_string(), write.version.to_string());
        let sha_map = state.hashes.entry(sha_map_key.to_string()).or_default();
        for (path, sha) in write.sha_upserts {
            sha_map.insert(path.clone(), sha.clone());
        }
        for path in write.sha_deletes {
            sha_map.remove(path);
        }
        let content = state.hashes.entry(content_key.to_string()).or_default();
        for (sha, text) in write.content_upserts {
            content.insert(sha.clone(), text.clone());
        }
        for sha in write.content_deletes {
            content.remove(sha);
        }
        Ok(())
    }

    async fn read_file_sha_map(&self, sha_map_key: &str) -> Result<FileShaMap> {
        self.hash_get_all(sha_map_key).await
    }
}
