//! C4 — Dependency Graph Builder. Maintains a cached `(nodes, edges)` graph
//! per `(repo, branch)` via a two-layer diff against remote state: a cheap
//! repo-level HEAD comparison first, a full file-level SHA partition only
//! when HEAD has advanced. Single-flight per `(repo, branch)` key; content
//! is fetched and cached by `contentSha`, never by `(path, commit)`.

pub mod imports;
pub mod resolve;

use crate::error::{Error, Result};
use crate::kv::{GraphWrite, KeyValueStore};
use crate::remote::RemoteRepository;
use crate::types::{DependencyGraphBlob, FileShaMap, GraphEdge, GraphMetadata, GraphNode, Language};
use resolve::PathResolver;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{Mutex, Notify};

/// Cooldown applied when a remote quota error carries no retry-after hint.
const RATE_LIMIT_FALLBACK_COOLDOWN_MS: i64 = 60_000;

pub struct GraphBuildResult {
    pub blob: DependencyGraphBlob,
    pub version: String,
}

pub struct GraphBuilder {
    kv: Arc<dyn KeyValueStore>,
    remote: Arc<dyn RemoteRepository>,
    head_check_min_interval_ms: i64,
    inflight: Mutex<HashMap<String, Arc<Notify>>>,
}

fn graph_key(repo: &str, branch: &str) -> String {
    format!("graph:{repo}:{branch}")
}
fn meta_key(repo: &str, branch: &str) -> String {
    format!("graph:meta:{repo}:{branch}")
}
fn sha_map_key(repo: &str, branch: &str) -> String {
    format!("graph:file_shas:{repo}:{branch}")
}
fn content_key(repo: &str, branch: &str) -> String {
    format!("graph:file_contents:{repo}:{branch}")
}
fn rate_limited_until_key(repo: &str, branch: &str) -> String {
    format!("graph:rate_limited_until:{repo}:{branch}")
}

impl GraphBuilder {
    pub fn new(kv: Arc<dyn KeyValueStore>, remote: Arc<dyn RemoteRepository>, head_check_min_interval_ms: i64) -> Self {
        Self {
            kv,
            remote,
            head_check_min_interval_ms,
            inflight: Mutex::new(HashMap::new()),
        }
    }

    /// `get_graph(repo, branch, forceRegenerate?)` entry point, per §4.5.
    /// `owner`/`repo_name` are the canonicalized halves used for remote
    /// calls; `repo` (their `/`-joined form) is the key namespace shared
    /// with the lock engine's `(repo, branch)` convention.
    pub async fn get_graph(
        &self,
        owner: &str,
        repo_name: &str,
        branch: &str,
        force_regenerate: bool,
        now_ms: i64,
    ) -> Result<GraphBuildResult> {
        let repo = format!("{owner}/{repo_name}");
        loop {
            if !force_regenerate {
                if let Some(hit) = self.try_fast_path(owner, repo_name, &repo, branch, now_ms).await? {
                    return Ok(hit);
                }
            }

            let flight_key = format!("{repo}:{branch}");
            let mut guard = self.inflight.lock().await;
            if let Some(notify) = guard.get(&flight_key).cloned() {
                drop(guard);
                notify.notified().await;
                continue;
            }
            let notify = Arc::new(Notify::new());
            guard.insert(flight_key.clone(), notify.clone());
            drop(guard);

            let result = self
                .build_and_persist(&repo, owner, repo_name, branch, force_regenerate, now_ms)
                .await;
            self.inflight.lock().await.remove(&flight_key);
            notify.notify_waiters();
            return result;
        }
    }

    /// Layer-1 shortcuts that avoid even entering the single-flight
    /// section: an active rate-limit cooldown, or a cached blob whose
    /// version still matches HEAD. The HEAD read goes through
    /// `RemoteRepository::get_head_cached`, which applies
    /// `head_check_min_interval_ms` itself — so this still avoids a
    /// network round-trip on every call, but never serves a cached blob
    /// past an actual HEAD change the way a pure elapsed-time guard would.
    async fn try_fast_path(
        &self,
        owner: &str,
        repo_name: &str,
        repo: &str,
        branch: &str,
        now_ms: i64,
    ) -> Result<Option<GraphBuildResult>> {
        if let Some(until) = self
            .kv
            .get_string(&rate_limited_until_key(repo, branch))
            .await?
            .and_then(|s| s.parse::<i64>().ok())
        {
            if now_ms < until {
                return match self.load_cached(repo, branch).await? {
                    Some((blob, version)) => Ok(Some(GraphBuildResult { blob, version })),
                    None => Err(Error::RemoteQuota {
                        retry_after_ms: Some(until - now_ms),
                    }),
                };
            }
        }

        let Some((blob, version)) = self.load_cached(repo, branch).await? else {
            return Ok(None);
        };
        let remote_head = self
            .remote
            .get_head_cached(owner, repo_name, branch, self.head_check_min_interval_ms)
            .await?;
        if remote_head == version {
            return Ok(Some(GraphBuildResult { blob, version }));
        }

        Ok(None)
    }

    async fn load_cached(&self, repo: &str, branch: &str) -> Result<Option<(DependencyGraphBlob, String)>> {
        let blob_raw = self.kv.get_string(&graph_key(repo, branch)).await?;
        let version_raw = self.kv.get_string(&meta_key(repo, branch)).await?;
        match (blob_raw, version_raw) {
            (Some(blob_json), Some(version)) => match serde_json::from_str::<DependencyGraphBlob>(&blob_json) {
                Ok(blob) => Ok(Some((blob, version))),
                Err(e) => {
                    tracing::warn!(repo, branch, error = %e, "dropping corrupt cached graph blob");
                    Ok(None)
                }
            },
            _ => Ok(None),
        }
    }

    /// Runs the real build, translating a remote quota error into the
    /// rate-limited-fallback behaviour (§4.4 "Rate-limited fallback").
    async fn build_and_persist(
        &self,
        repo: &str,
        owner: &str,
        repo_name: &str,
        branch: &str,
        force_regenerate: bool,
        now_ms: i64,
    ) -> Result<GraphBuildResult> {
        match self
            .try_build(repo, owner, repo_name, branch, force_regenerate, now_ms)
            .await
        {
            Ok(result) => Ok(result),
            Err(Error::RemoteQuota { retry_after_ms }) => {
                let until = now_ms + retry_after_ms.unwrap_or(RATE_LIMIT_FALLBACK_COOLDOWN_MS);
                self.kv
                    .set_string(&rate_limited_until_key(repo, branch), &until.to_string())
                    .await?;
                match self.load_cached(repo, branch).await? {
                    Some((blob, version)) => {
                        tracing::warn!(repo, branch, "remote quota exhausted, serving cached graph");
                        Ok(GraphBuildResult { blob, version })
                    }
                    None => Err(Error::RemoteQuota {
                        retry_after_ms: Some(until - now_ms),
                    }),
                }
            }
            Err(other) => Err(other),
        }
    }

    async fn try_build(
        &self,
        repo: &str,
        owner: &str,
        repo_name: &str,
        branch: &str,
        force_regenerate: bool,
        now_ms: i64,
    ) -> Result<GraphBuildResult> {
        let cached = self.load_cached(repo, branch).await?;
        let old_sha_map: FileShaMap = self.kv.read_file_sha_map(&sha_map_key(repo, branch)).await?;

        let remote_head = self
            .remote
            .get_head_cached(owner, repo_name, branch, self.head_check_min_interval_ms)
            .await?;

        if !force_regenerate {
            if let Some((blob, version)) = &cached {
                if *version == remote_head {
                    return Ok(GraphBuildResult {
                        blob: blob.clone(),
                        version: version.clone(),
                    });
                }
            }
        }

        let tree = self.remote.get_tree_recursive(owner, repo_name, &remote_head).await?;
        let mut new_sha_map: FileShaMap = HashMap::with_capacity(tree.len());
        let mut sizes: HashMap<String, Option<u64>> = HashMap::with_capacity(tree.len());
        for entry in &tree {
            new_sha_map.insert(entry.path.clone(), entry.sha.clone());
            sizes.insert(entry.path.clone(), entry.size);
        }

        let new_paths: HashSet<String> = new_sha_map
            .keys()
            .filter(|p| !old_sha_map.contains_key(*p))
            .cloned()
            .collect();
        let changed_paths: HashSet<String> = new_sha_map
            .iter()
            .filter(|(p, sha)| old_sha_map.get(*p).is_some_and(|old_sha| old_sha != *sha))
            .map(|(p, _)| p.clone())
            .collect();
        let deleted_paths: Vec<String> = old_sha_map
            .keys()
            .filter(|p| !new_sha_map.contains_key(*p))
            .cloned()
            .collect();

        let corrupt_or_missing_cache = cached.is_none() && !old_sha_map.is_empty();
        let full_rebuild = !new_paths.is_empty() || corrupt_or_missing_cache;

        let reparse_set: HashSet<String> = if full_rebuild {
            new_sha_map.keys().cloned().collect()
        } else {
            new_paths.union(&changed_paths).cloned().collect()
        };

        let tree_files: HashSet<String> = new_sha_map.keys().cloned().collect();
        let unchanged_set: HashSet<&String> = tree_files.iter().filter(|p| !reparse_set.contains(*p)).collect();

        let mut edges: HashSet<GraphEdge> = HashSet::new();
        if let Some((old_blob, _)) = &cached {
            for edge in &old_blob.edges {
                if unchanged_set.contains(&edge.source) && tree_files.contains(&edge.target) {
                    edges.insert(edge.clone());
                }
            }
        }

        let resolver = PathResolver::new();
        let mut content_upserts: Vec<(String, String)> = Vec::new();
        let ck = content_key(repo, branch);

        for path in &reparse_set {
            let sha = &new_sha_map[path];
            let Some(language) = Language::from_path(path) else {
                continue;
            };
            let text = match self.kv.hash_get(&ck, sha).await? {
                Some(cached_text) => Some(cached_text),
                None => match self.remote.get_file_content(owner, repo_name, path, sha).await? {
                    Some(text) => {
                        content_upserts.push((sha.clone(), text.clone()));
                        Some(text)
                    }
                    None => None,
                },
            };
            let Some(text) = text else { continue };
            for module in imports::extract_module_strings(language, &text) {
                if let Some(target) = resolver.resolve(path, &module, &tree_files) {
                    edges.insert(GraphEdge::new_import(path.clone(), target));
                }
            }
        }

        let mut edges: Vec<GraphEdge> = edges.into_iter().collect();
        edges.sort();

        let mut nodes: Vec<GraphNode> = new_sha_map
            .keys()
            .map(|path| GraphNode::new_file(path.clone(), sizes.get(path).copied().flatten(), Language::from_path(path)))
            .collect();
        nodes.sort_by(|a, b| a.id.cmp(&b.id));

        let metadata = GraphMetadata {
            generated_at: now_ms,
            files_processed: reparse_set.len(),
            edges_found: edges.len(),
        };

        let blob = DependencyGraphBlob { nodes, edges, metadata };
        let blob_json = serde_json::to_string(&blob)?;

        let sha_upserts: Vec<(String, String)> = new_paths
            .union(&changed_paths)
            .map(|p| (p.clone(), new_sha_map[p].clone()))
            .collect();

        let old_shas: HashSet<&String> = old_sha_map.values().collect();
        let new_shas: HashSet<&String> = new_sha_map.values().collect();
        let content_deletes: Vec<String> = old_shas.difference(&new_shas).map(|s| s.to_string()).collect();

        self.kv
            .persist_graph(
                &graph_key(repo, branch),
                &meta_key(repo, branch),
                &sha_map_key(repo, branch),
                &ck,
                GraphWrite {
                    blob_json: &blob_json,
                    version: &remote_head,
                    sha_upserts: &sha_upserts,
                    sha_deletes: &deleted_paths,
                    content_upserts: &content_upserts,
                    content_deletes: &content_deletes,
                },
            )
            .await?;

        self.kv.delete(&rate_limited_until_key(repo, branch)).await?;

        Ok(GraphBuildResult {
            blob,
            version: remote_head,
        })
    }
}
