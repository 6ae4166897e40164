//! In-memory [`RemoteRepository`] fake for unit tests that exercise C4/C5
//! without standing up a `wiremock` server. Each `(owner, repo)` maps to a
//! sequence of commits the test can push, each with its own tree.

use super::{RemoteRepository, TreeEntry};
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Debug, Clone, Default)]
pub struct FakeCommit {
    pub sha: String,
    pub tree: Vec<TreeEntry>,
    pub contents: HashMap<String, String>,
}

#[derive(Debug, Default)]
struct BranchState {
    commits: Vec<FakeCommit>,
}

#[derive(Debug, Default)]
pub struct FakeRemoteRepository {
    branches: Mutex<HashMap<(String, String, String), BranchState>>,
}

impl FakeRemoteRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pushes a new commit onto `(owner, repo, branch)`, making it the head.
    pub fn push_commit(&self, owner: &str, repo: &str, branch: &str, commit: FakeCommit) {
        let key = (owner.to_string(), repo.to_string(), branch.to_string());
        self.branches
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entry(key)
            .or_default()
            .commits
            .push(commit);
    }
}

#[async_trait]
impl RemoteRepository for FakeRemoteRepository {
    async fn get_head(&self, owner: &str, repo: &str, branch: &str) -> Result<String> {
        let key = (owner.to_string(), repo.to_string(), branch.to_string());
        let branches = self.branches.lock().unwrap_or_else(|e| e.into_inner());
        branches
            .get(&key)
            .and_then(|b| b.commits.last())
            .map(|c| c.sha.clone())
            .ok_or_else(|| Error::Transient(format!("no commits for {owner}/{repo}@{branch}")))
    }

    async fn get_head_cached(
        &self,
        owner: &str,
        repo: &str,
        branch: &str,
        _max_age_ms: i64,
    ) -> Result<String> {
        self.get_head(owner, repo, branch).await
    }

    async fn get_tree_recursive(&self, owner: &str, repo: &str, sha: &str) -> Result<Vec<TreeEntry>> {
        let branches = self.branches.lock().unwrap_or_else(|e| e.into_inner());
        for branch in branches.values() {
            if let Some(commit) = branch.commits.iter().find(|c| c.sha == sha) {
                return Ok(commit.tree.clone());
            }
        }
        Err(Error::Transient(format!("unknown commit {owner}/{repo}@{sha}")))
    }

    async fn get_file_content(
        &self,
        owner: &str,
        repo: &str,
        path: &str,
        sha: &str,
    ) -> Result<Option<String>> {
        let branches = self.branches.lock().unwrap_or_else(|e| e.into_inner());
        for branch in branches.values() {
            for commit in &branch.commits {
                if commit.tree.iter().any(|e| e.path == path && e.sha == sha) {
                    return Ok(commit.contents.get(path).cloned());
                }
            }
        }
        let _ = (owner, repo);
        Ok(None)
    }
}
