//! Redis-backed [`KeyValueStore`]. Lock mutation protocols run as Lua
//! scripts so the check-then-commit phases of acquire, the owner-guarded
//! delete of release, and the sweep are each a single atomic round trip —
//! exactly the pattern this codebase already uses for scripted CAS writes,
//! generalized here from a single-key compare-and-swap to a multi-file
//! check-then-commit over one hash key.

use super::{GraphWrite, KeyValueStore, LockAcquireOutcome, LockAcquireRequest};
use crate::error::{Error, Result};
use crate::types::{FileShaMap, LockEntry};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Script};
use std::collections::HashMap;

/// Atomic multi-file check-then-commit acquire.
///
/// `KEYS[1]` = lock hash key.
/// `ARGV[1]` = now_ms, `ARGV[2]` = requested status, `ARGV[3]` = user_id,
/// `ARGV[4]` = "1"/"0" whether READING conflicts with READING.
/// `ARGV[5..]` = repeated `(file_path, entry_json)` pairs, one per file.
/// Returns `{"OK"}` on success or `{"CONFLICT", file, conflicting_user_id}`.
const LUA_ACQUIRE: &str = r#"
local now = tonumber(ARGV[1])
local status = ARGV[2]
local user_id = ARGV[3]
local reading_conflicts = ARGV[4] == "1"
local n = (#ARGV - 4) / 2

for i = 0, n - 1 do
    local file = ARGV[5 + i * 2]
    local existing = redis.call('HGET', KEYS[1], file)
    if existing then
        local ok, entry = pcall(cjson.decode, existing)
        if ok and entry.expiry and tonumber(entry.expiry) > now and entry.user_id ~= user_id then
            local shared_read = status == "READING" and entry.status == "READING" and not reading_conflicts
            if not shared_read then
                return {"CONFLICT", file, entry.user_id}
            end
        end
    end
end

for i = 0, n - 1 do
    local file = ARGV[5 + i * 2]
    local entry_json = ARGV[6 + i * 2]
    redis.call('HSET', KEYS[1], file, entry_json)
end

return {"OK"}
"#;

/// Owner-guarded delete. `KEYS[1]` = lock hash key, `ARGV[1]` = user_id,
/// `ARGV[2..]` = file paths. Non-owned files are silently skipped.
const LUA_RELEASE: &str = r#"
local user_id = ARGV[1]
for i = 2, #ARGV do
    local file = ARGV[i]
    local existing = redis.call('HGET', KEYS[1], file)
    if existing then
        local ok, entry = pcall(cjson.decode, existing)
        if ok and entry.user_id == user_id then
            redis.call('HDEL', KEYS[1], file)
        end
    end
end
return 1
"#;

/// Sweeps one lock hash key, dropping entries whose `expiry` has passed or
/// that fail to decode. `KEYS[1]` = lock hash key, `ARGV[1]` = now_ms.
/// Returns the number removed.
const LUA_SWEEP: &str = r#"
local now = tonumber(ARGV[1])
local all = redis.call('HGETALL', KEYS[1])
local removed = 0
for i = 1, #all, 2 do
    local file = all[i]
    local val = all[i + 1]
    local ok, entry = pcall(cjson.decode, val)
    if not ok or not entry.expiry or tonumber(entry.expiry) < now then
        redis.call('HDEL', KEYS[1], file)
        removed = removed + 1
    end
end
return removed
"#;

#[derive(Debug, Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
}

impl RedisStore {
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url).map_err(Error::from)?;
        let conn = client
            .get_connection_manager()
            .await
            .map_err(Error::from)?;
        Ok(Self { conn })
    }
}

#[async_trait]
impl KeyValueStore for RedisStore {
    async fn get_string(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.conn.clone();
        Ok(conn.get(key).await?)
    }

    async fn set_string(&self, key: &str, value: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: () = conn.set(key, value).await?;
        Ok(())
    }

    async fn hash_get_all(&self, key: &str) -> Result<HashMap<String, String>> {
        let mut conn = self.conn.clone();
        Ok(conn.hgetall(key).await?)
    }

    async fn hash_get(&self, key: &str, field: &str) -> Result<Option<String>> {
        let mut conn = self.conn.clone();
        Ok(conn.hget(key, field).await?)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: () = conn.del(key).await?;
        Ok(())
    }

    async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        let mut conn = self.conn.clone();
        // SCAN over KEYS for production safety against large keyspaces;
        // small pattern, acceptable to block on for our bounded namespace.
        let pattern = format!("{prefix}*");
        Ok(conn.keys(pattern).await?)
    }

    async fn acquire_locks(&self, req: &LockAcquireRequest<'_>) -> Result<LockAcquireOutcome> {
        let mut conn = self.conn.clone();
        let status_str = match req.status {
            crate::types::LockStatus::Reading => "READING",
            crate::types::LockStatus::Writing => "WRITING",
        };

        let mut entries = Vec::with_capacity(req.files.len());
        let mut script = Script::new(LUA_ACQUIRE).prepare_invoke();
        script
            .key(req.lock_key)
            .arg(req.now_ms)
            .arg(status_str)
            .arg(req.user_id)
            .arg(if req.reading_conflicts_with_reading { "1" } else { "0" });

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
            let entry_json = serde_json::to_string(&entry)?;
            script.arg(file).arg(entry_json);
            entries.push(entry);
        }

        let reply: Vec<String> = script.invoke_async(&mut conn).await?;
        match reply.first().map(String::as_str) {
            Some("OK") => Ok(LockAcquireOutcome::Installed(entries)),
            Some("CONFLICT") => Ok(LockAcquireOutcome::Conflict {
                conflicting_file: reply.get(1).cloned().unwrap_or_default(),
                conflicting_user: reply.get(2).cloned().unwrap_or_default(),
            }),
            _ => Err(Error::Transient("unexpected acquire script reply".into())),
        }
    }

    async fn release_locks(&self, lock_key: &str, user_id: &str, files: &[String]) -> Result<()> {
        let mut conn = self.conn.clone();
        let mut script = Script::new(LUA_RELEASE).prepare_invoke();
        script.key(lock_key).arg(user_id);
        for file in files {
            script.arg(file);
        }
        let _: i64 = script.invoke_async(&mut conn).await?;
        Ok(())
    }

    async fn release_all_locks(&self, lock_key: &str) -> Result<u64> {
        let mut conn = self.conn.clone();
        let count: u64 = conn.hlen(lock_key).await?;
        let _: () = conn.del(lock_key).await?;
        Ok(count)
    }

    async fn sweep_locks(&self, lock_key_prefix: &str, now_ms: i64) -> Result<u64> {
        let keys = self.keys_with_prefix(lock_key_prefix).await?;
        let mut conn = self.conn.clone();
        let script = Script::new(LUA_SWEEP);
        let mut total = 0u64;
        for key in keys {
            let removed: u64 = script.key(&key).arg(now_ms).invoke_async(&mut conn).await?;
            total += removed;
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
        let mut conn = self.conn.clone();
        let mut pipe = redis::pipe();
        pipe.atomic()
            .set(blob_key, write.blob_json)
            .ignore()
            .set(version_key, write.version)
            .ignore();
        for (path, sha) in write.sha_upserts {
            pipe.hset(sha_map_key, path, sha).ignore();
        }
        for path in write.sha_deletes {
            pipe.hdel(sha_map_key, path).ignore();
        }
        for (sha, text) in write.content_upserts {
            pipe.hset(content_key, sha, text).ignore();
        }
        for sha in write.content_deletes {
            pipe.hdel(content_key, sha).ignore();
        }
        let _: () = pipe.query_async(&mut conn).await?;
        Ok(())
    }

    async fn read_file_sha_map(&self, sha_map_key: &str) -> Result<FileShaMap> {
        self.hash_get_all(sha_map_key).await
    }
}
