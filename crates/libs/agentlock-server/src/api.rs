use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use agentlock_core::coordination::{CheckStatusKind, CheckStatusRequest, PostStatusRequest};
use agentlock_core::remote::canonicalize_repo_url;
use agentlock_core::types::{DependencyGraph, LockEntry, OrchestrationCommand};

use crate::error::{Result, ServerError};
use crate::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/check_status", post(check_status))
        .route("/api/post_status", post(post_status))
        .route("/api/get_graph", post(get_graph))
        .route("/api/release_all_locks", post(release_all_locks))
        .route("/api/cleanup_stale_locks", post(cleanup_stale_locks))
}

fn split_repo(repo_url: &str) -> Result<(String, String)> {
    canonicalize_repo_url(repo_url)
        .ok_or_else(|| ServerError::bad_request(format!("unrecognized repo_url: {repo_url}")))
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

// --- check_status ---

#[derive(Deserialize)]
pub struct CheckStatusPayload {
    pub repo_url: String,
    pub branch: String,
    pub file_paths: Vec<String>,
    pub agent_head: String,
}

#[derive(Serialize)]
pub struct CheckStatusResponse {
    pub status: CheckStatusKind,
    pub repo_head: String,
    pub locks: HashMap<String, LockEntry>,
    pub warnings: Vec<String>,
    pub orchestration: OrchestrationCommand,
}

pub async fn check_status(
    State(state): State<AppState>,
    Json(payload): Json<CheckStatusPayload>,
) -> Result<Json<CheckStatusResponse>> {
    if payload.file_paths.is_empty() || payload.agent_head.trim().is_empty() || payload.branch.trim().is_empty() {
        return Err(ServerError::bad_request("repo_url, branch, file_paths, and agent_head are required"));
    }
    let (owner, repo_name) = split_repo(&payload.repo_url)?;

    let result = state
        .api
        .check_status(
            CheckStatusRequest {
                owner: &owner,
                repo_name: &repo_name,
                branch: &payload.branch,
                file_paths: &payload.file_paths,
                agent_head: &payload.agent_head,
            },
            now_ms(),
        )
        .await?;

    Ok(Json(CheckStatusResponse {
        status: result.status,
        repo_head: result.remote_head,
        locks: result.locks,
        warnings: result.warnings,
        orchestration: result.orchestration,
    }))
}

// --- post_status ---

#[derive(Deserialize)]
pub struct PostStatusPayload {
    pub repo_url: String,
    pub branch: String,
    pub file_paths: Vec<String>,
    pub status: String,
    pub message: String,
    pub user_id: String,
    pub user_name: String,
    pub agent_head: Option<String>,
    pub new_repo_head: Option<String>,
}

#[derive(Serialize)]
pub struct PostStatusResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub locks: Option<Vec<LockEntry>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub orphaned_dependencies: Option<Vec<String>>,
    pub orchestration: OrchestrationCommand,
}

pub async fn post_status(
    State(state): State<AppState>,
    Json(payload): Json<PostStatusPayload>,
) -> Result<Json<PostStatusResponse>> {
    if payload.file_paths.is_empty()
        || payload.branch.trim().is_empty()
        || payload.status.trim().is_empty()
        || payload.message.trim().is_empty()
        || payload.user_id.trim().is_empty()
    {
        return Err(ServerError::bad_request(
            "repo_url, branch, file_paths, status, message, and user_id are required",
        ));
    }
    let (owner, repo_name) = split_repo(&payload.repo_url)?;

    let result = state
        .api
        .post_status(
            PostStatusRequest {
                owner: &owner,
                repo_name: &repo_name,
                branch: &payload.branch,
                file_paths: &payload.file_paths,
                status: &payload.status,
                message: &payload.message,
                user_id: &payload.user_id,
                user_name: &payload.user_name,
                agent_head: payload.agent_head.as_deref(),
                new_repo_head: payload.new_repo_head.as_deref(),
            },
            now_ms(),
            state.default_ttl_ms,
        )
        .await?;

    for event in &result.activity_events {
        tracing::info!(
            event_type = %event.event_type,
            user_id = %event.user_id,
            file_path = %event.file_path,
            "activity"
        );
    }

    let success = !matches!(
        result.orchestration.action,
        agentlock_core::types::OrchestrationAction::SwitchTask
            | agentlock_core::types::OrchestrationAction::Pull
            | agentlock_core::types::OrchestrationAction::Push
    );

    Ok(Json(PostStatusResponse {
        success,
        locks: result.locks,
        orphaned_dependencies: if result.orphaned_dependencies.is_empty() {
            None
        } else {
            Some(result.orphaned_dependencies)
        },
        orchestration: result.orchestration,
    }))
}

// --- get_graph ---

#[derive(Deserialize)]
pub struct GetGraphPayload {
    pub repo_url: String,
    pub branch: String,
    #[serde(default)]
    pub regenerate: bool,
}

pub async fn get_graph(
    State(state): State<AppState>,
    Json(payload): Json<GetGraphPayload>,
) -> Result<Json<DependencyGraph>> {
    if payload.branch.trim().is_empty() {
        return Err(ServerError::bad_request("repo_url and branch are required"));
    }
    let (owner, repo_name) = split_repo(&payload.repo_url)?;

    let graph = state
        .api
        .get_graph(&owner, &repo_name, &payload.branch, payload.regenerate, now_ms())
        .await?;

    Ok(Json(graph))
}

// --- release_all_locks ---

#[derive(Deserialize)]
pub struct ReleaseAllLocksPayload {
    pub repo_url: String,
    pub branch: String,
}

#[derive(Serialize)]
pub struct ReleaseAllLocksResponse {
    pub success: bool,
    pub released: u64,
}

pub async fn release_all_locks(
    State(state): State<AppState>,
    Json(payload): Json<ReleaseAllLocksPayload>,
) -> Result<Json<ReleaseAllLocksResponse>> {
    if payload.branch.trim().is_empty() {
        return Err(ServerError::bad_request("repo_url and branch are required"));
    }
    let (owner, repo_name) = split_repo(&payload.repo_url)?;

    let released = state.api.release_all_locks(&owner, &repo_name, &payload.branch).await?;
    Ok(Json(ReleaseAllLocksResponse { success: true, released }))
}

// --- cleanup_stale_locks ---

#[derive(Deserialize)]
pub struct CleanupStaleLocksPayload {
    pub shared_secret: String,
}

#[derive(Serialize)]
pub struct CleanupStaleLocksResponse {
    pub success: bool,
    pub cleaned: u64,
    pub timestamp: i64,
}

pub async fn cleanup_stale_locks(
    State(state): State<AppState>,
    Json(payload): Json<CleanupStaleLocksPayload>,
) -> Result<Json<CleanupStaleLocksResponse>> {
    if payload.shared_secret != state.sweeper_shared_secret {
        return Err(ServerError::Unauthenticated);
    }

    let now = now_ms();
    let cleaned = state.api.cleanup_stale_locks(now).await?;
    Ok(Json(CleanupStaleLocksResponse {
        success: true,
        cleaned,
        timestamp: now,
    }))
}
