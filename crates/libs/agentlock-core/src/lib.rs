//! # agentlock-core: coordination logic for concurrent AI coding agents
//!
//! `agentlock-core` mediates advisory file-level locks between multiple
//! agents working against the same Git repository and branch, tracks
//! whether each agent's view of the branch is stale against the remote
//! HEAD, and maintains a best-effort file dependency graph so conflicts on
//! files one hop away from a requested file can be surfaced too.
//!
//! ## Architecture
//!
//! - [`kv`]: the key-value store adapter (C1) — a thin Redis-shaped
//!   interface, with an in-memory fake for tests.
//! - [`lock`]: the Lock Engine (C2) — validates and executes the atomic
//!   acquire/release/sweep protocol.
//! - [`remote`]: the Remote Repository Adapter (C3) — HEAD, tree, and file
//!   content lookups against a Git host.
//! - [`graph`]: the Dependency Graph Builder (C4) — incremental,
//!   single-flight per `(repo, branch)`.
//! - [`coordination`]: the Coordination API (C5) — composes C2/C3/C4 into
//!   `check_status`, `post_status`, `get_graph`, and the two administrative
//!   operations.
//! - [`sweeper`]: the background task that periodically invokes the lock
//!   engine's sweep.
//!
//! ## Example
//!
//! ```no_run
//! use agentlock_core::coordination::{CoordinationApi, CheckStatusRequest};
//! use agentlock_core::kv::RedisStore;
//! use agentlock_core::remote::github::GitHubRemoteRepository;
//! use std::sync::Arc;
//!
//! async fn example() -> agentlock_core::Result<()> {
//!     let kv = Arc::new(RedisStore::connect("redis://localhost").await?);
//!     let remote = Arc::new(GitHubRemoteRepository::new(
//!         "https://api.github.com".to_string(),
//!         Some("token".to_string()),
//!         10_000,
//!     )?);
//!     let api = CoordinationApi::new(kv, remote, 20_000);
//!
//!     let files = vec!["src/main.rs".to_string()];
//!     let result = api
//!         .check_status(
//!             CheckStatusRequest {
//!                 owner: "acme",
//!                 repo_name: "widgets",
//!                 branch: "main",
//!                 file_paths: &files,
//!                 agent_head: "deadbeef",
//!             },
//!             0,
//!         )
//!         .await?;
//!     println!("{:?}", result.status);
//!     Ok(())
//! }
//! ```

/// Errors and the shared `Result` alias.
pub mod error;

/// Shared data model: lock entries, the dependency graph, orchestration commands.
pub mod types;

/// C1 — key-value store adapter.
pub mod kv;

/// C2 — lock engine.
pub mod lock;

/// C3 — remote repository adapter.
pub mod remote;

/// C4 — dependency graph builder.
pub mod graph;

/// C5 — coordination API composing C2/C3/C4.
pub mod coordination;

/// Background stale-lock sweeper.
pub mod sweeper;

pub use error::{Error, Result};
