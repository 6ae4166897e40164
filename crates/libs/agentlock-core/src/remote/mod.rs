//! C3 — Remote Repository Adapter. Resolves branch HEAD, the file tree
//! with per-file content-addressed SHAs, and file content on demand,
//! against a GitHub-shaped REST API.

pub mod fake;
pub mod github;

use crate::error::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

pub use fake::FakeRemoteRepository;
pub use github::GitHubRemoteRepository;

/// Extensions the dependency graph builder understands; the tree fetch is
/// restricted to these so the adapter never returns unsupported blobs.
pub const SUPPORTED_EXTENSIONS: &[&str] = &["ts", "tsx", "js", "jsx", "py"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeEntry {
    pub path: String,
    pub sha: String,
    pub size: Option<u64>,
}

#[async_trait]
pub trait RemoteRepository: Send + Sync + std::fmt::Debug {
    async fn get_head(&self, owner: &str, repo: &str, branch: &str) -> Result<String>;

    /// `getHeadCached(owner, repo, branch, maxAgeMs)` per §4.3: returns the
    /// cached HEAD without a remote call when the cache is within
    /// `max_age_ms`; otherwise refreshes and stores the result. Each
    /// implementor owns its own [`HeadCache`] instance.
    async fn get_head_cached(
        &self,
        owner: &str,
        repo: &str,
        branch: &str,
        max_age_ms: i64,
    ) -> Result<String>;

    async fn get_tree_recursive(&self, owner: &str, repo: &str, sha: &str) -> Result<Vec<TreeEntry>>;
    async fn get_file_content(
        &self,
        owner: &str,
        repo: &str,
        path: &str,
        sha: &str,
    ) -> Result<Option<String>>;
}

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Current wall-clock time in ms epoch, exposed for adapters that need to
/// compute a retry-after delta from an absolute reset timestamp.
pub fn now_ms_pub() -> i64 {
    now_ms()
}

/// Per-process `(sha, fetched_at)` cache with a short validity window,
/// shared by any `RemoteRepository` implementation via composition.
#[derive(Debug, Default)]
pub struct HeadCache {
    entries: Mutex<HashMap<(String, String, String), (String, i64)>>,
}

impl HeadCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// `getHeadCached(owner, repo, branch, maxAgeMs)` per §4.3: if the
    /// cached entry is within `max_age_ms`, return it without calling the
    /// remote; otherwise refresh via `fetch` and store the result.
    pub async fn get_or_refresh<F, Fut>(
        &self,
        owner: &str,
        repo: &str,
        branch: &str,
        max_age_ms: i64,
        fetch: F,
    ) -> Result<String>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<String>>,
    {
        let key = (owner.to_string(), repo.to_string(), branch.to_string());
        if max_age_ms > 0 {
            let cached = self.entries.lock().unwrap_or_else(|e| e.into_inner()).get(&key).cloned();
            if let Some((sha, fetched_at)) = cached {
                if now_ms() - fetched_at <= max_age_ms {
                    return Ok(sha);
                }
            }
        }

        let sha = fetch().await?;
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key, (sha.clone(), now_ms()));
        Ok(sha)
    }
}

/// Canonicalizes owner/repo from input URL variants
/// (`https://github.com/Owner/Repo`, `github.com/Owner/Repo.git`, a bare
/// `Owner/Repo`, etc.) by lower-casing and stripping a trailing `.git`.
/// Every downstream key is keyed by this canonical form.
pub fn canonicalize_repo_url(input: &str) -> Option<(String, String)> {
    let trimmed = input
        .trim()
        .trim_start_matches("https://")
        .trim_start_matches("http://")
        .trim_start_matches("github.com/")
        .trim_start_matches("www.github.com/");
    let trimmed = trimmed.strip_prefix("github.com/").unwrap_or(trimmed);
    let trimmed = trimmed.trim_end_matches('/');
    let trimmed = trimmed.strip_suffix(".git").unwrap_or(trimmed);

    let mut parts = trimmed.splitn(2, '/');
    let owner = parts.next()?.to_lowercase();
    let repo = parts.next()?.to_lowercase();
    if owner.is_empty() || repo.is_empty() {
        return None;
    }
    Some((owner, repo))
}

pub fn is_supported_extension(path: &str) -> bool {
    path.rsplit('.')
        .next()
        .map(|ext| SUPPORTED_EXTENSIONS.contains(&ext))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonicalizes_https_url() {
        assert_eq!(
            canonicalize_repo_url("https://github.com/Owner/Repo"),
            Some(("owner".to_string(), "repo".to_string()))
        );
    }

    #[test]
    fn canonicalizes_bare_host_with_git_suffix() {
        assert_eq!(
            canonicalize_repo_url("github.com/Owner/Repo.git"),
            Some(("owner".to_string(), "repo".to_string()))
        );
    }

    #[test]
    fn canonicalizes_owner_slash_repo() {
        assert_eq!(
            canonicalize_repo_url("Owner/Repo"),
            Some(("owner".to_string(), "repo".to_string()))
        );
    }

    #[test]
    fn rejects_missing_repo_segment() {
        assert_eq!(canonicalize_repo_url("justowner"), None);
    }
}
