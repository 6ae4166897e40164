//! Shared data model: lock entries, the dependency graph, and the
//! orchestration command shape composed by [`crate::coordination`].

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Fixed lock TTL used when a caller does not override it, matching the
/// reference value from the lock engine design (300,000 ms).
pub const DEFAULT_TTL_MS: i64 = 300_000;

/// Source languages the dependency graph builder understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Ts,
    Js,
    Py,
}

impl Language {
    pub fn from_path(path: &str) -> Option<Self> {
        let ext = path.rsplit('.').next()?;
        match ext {
            "ts" | "tsx" => Some(Language::Ts),
            "js" | "jsx" => Some(Language::Js),
            "py" => Some(Language::Py),
            _ => None,
        }
    }
}

/// Whether a held lock is a shared read intent or an exclusive write intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LockStatus {
    Reading,
    Writing,
}

/// An advisory record that a specific user intends to read or write a
/// specific file for a bounded time. Identified externally by
/// `(repo, branch, filePath)`; the triple is the caller's key into the
/// lock hash, not stored redundantly on the entry itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LockEntry {
    pub file_path: String,
    pub user_id: String,
    pub user_name: String,
    pub status: LockStatus,
    /// Commit id the owner observed at acquisition time.
    pub agent_head: String,
    /// Non-empty: the agent's stated intent, shown to observers.
    pub message: String,
    /// Creation/refresh time, ms epoch.
    pub timestamp: i64,
    /// `timestamp + ttl`, ms epoch.
    pub expiry: i64,
}

impl LockEntry {
    pub fn is_expired(&self, now_ms: i64) -> bool {
        self.expiry <= now_ms
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: String,
    #[serde(rename = "type")]
    pub node_type: String,
    pub size: Option<u64>,
    pub language: Option<Language>,
}

impl GraphNode {
    pub fn new_file(path: impl Into<String>, size: Option<u64>, language: Option<Language>) -> Self {
        Self {
            id: path.into(),
            node_type: "file".to_string(),
            size,
            language,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
pub struct GraphEdge {
    pub source: String,
    pub target: String,
    #[serde(rename = "type")]
    pub edge_type: String,
}

impl GraphEdge {
    pub fn new_import(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            edge_type: "import".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphMetadata {
    pub generated_at: i64,
    pub files_processed: usize,
    pub edges_found: usize,
}

/// The structural part persisted by C4, plus a freshly overlaid lock map
/// that is never itself part of the persisted blob (§3 invariant 5 / §4.4
/// "Output at read time").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DependencyGraph {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
    #[serde(default)]
    pub locks: HashMap<String, LockEntry>,
    pub version: String,
    pub metadata: GraphMetadata,
}

/// Structural part only — what actually gets serialized into `graph:{repo}:{branch}`.
/// `locks` is deliberately excluded; see `DependencyGraph::with_locks`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DependencyGraphBlob {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
    pub metadata: GraphMetadata,
}

impl DependencyGraphBlob {
    pub fn with_locks(self, version: String, locks: HashMap<String, LockEntry>) -> DependencyGraph {
        DependencyGraph {
            nodes: self.nodes,
            edges: self.edges,
            locks,
            version,
            metadata: self.metadata,
        }
    }
}

/// `filePath → remoteContentSha` per `(repo, branch)`.
pub type FileShaMap = HashMap<String, String>;

/// The directive returned alongside a business outcome, telling the caller
/// what to do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrchestrationAction {
    Proceed,
    Pull,
    Push,
    SwitchTask,
    Stop,
    Wait,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestrationCommand {
    pub action: OrchestrationAction,
    pub command: Option<String>,
    pub reason: String,
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl OrchestrationCommand {
    pub fn proceed(reason: impl Into<String>) -> Self {
        Self {
            action: OrchestrationAction::Proceed,
            command: None,
            reason: reason.into(),
            metadata: serde_json::Map::new(),
        }
    }

    pub fn pull(reason: impl Into<String>, remote_head: &str, your_head: &str) -> Self {
        let mut metadata = serde_json::Map::new();
        metadata.insert("remote_head".into(), remote_head.into());
        metadata.insert("your_head".into(), your_head.into());
        Self {
            action: OrchestrationAction::Pull,
            command: Some("git pull --rebase".to_string()),
            reason: reason.into(),
            metadata,
        }
    }

    pub fn push(reason: impl Into<String>) -> Self {
        Self {
            action: OrchestrationAction::Push,
            command: Some("git push".to_string()),
            reason: reason.into(),
            metadata: serde_json::Map::new(),
        }
    }

    pub fn switch_task(reason: impl Into<String>) -> Self {
        Self {
            action: OrchestrationAction::SwitchTask,
            command: None,
            reason: reason.into(),
            metadata: serde_json::Map::new(),
        }
    }
}

/// Whether a reported lock sits on a file the caller asked about directly,
/// or on a file reachable via the dependency graph from one the caller
/// asked about. `NEIGHBOR` can only be computed when a cached graph is
/// available (§9 design notes).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LockKind {
    Direct,
    Neighbor,
}

/// Derived, not persisted by the core. Emitted fire-and-forget from
/// `post_status` (§9 "Activity stream"). `status` carries the raw status
/// string the caller posted (`"WRITING"`, `"READING"`, `"OPEN"`, or any
/// other informational value) rather than `LockStatus`, since informational
/// statuses have no held-lock analog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityEvent {
    pub event_type: String,
    pub user_id: String,
    pub user_name: String,
    pub message: String,
    pub timestamp: i64,
    pub file_path: String,
    pub status: String,
}
