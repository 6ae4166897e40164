//! Maps [`agentlock_core::Error`] onto the HTTP surface of §7. Business
//! outcomes (`Conflict`, `Staleness`) never reach here — C5 encodes them in
//! a successful response body via the orchestration command. Only
//! validation, quota, transient, and corruption-escaping errors become
//! non-200 responses.

use agentlock_core::Error as CoreError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub code: &'static str,
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_ms: Option<i64>,
}

#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("unauthenticated")]
    Unauthenticated,
}

impl ServerError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }
}

pub type Result<T> = std::result::Result<T, ServerError>;

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        tracing::warn!(error = ?self, "request failed");

        let (status, code, message, retry_after_ms) = match &self {
            ServerError::Core(CoreError::Validation(msg)) => {
                (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone(), None)
            }
            ServerError::Core(CoreError::RemoteQuota { retry_after_ms }) => (
                StatusCode::TOO_MANY_REQUESTS,
                "REMOTE_QUOTA",
                "remote repository quota exhausted".to_string(),
                *retry_after_ms,
            ),
            ServerError::Core(CoreError::Transient(msg)) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "TRANSIENT", msg.clone(), None)
            }
            ServerError::Core(CoreError::Corruption { key, detail }) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "CORRUPTION",
                format!("corrupt state at {key}: {detail}"),
                None,
            ),
            // Conflict/Staleness are business outcomes and should have been
            // caught and encoded by the coordination layer; reaching here
            // means a caller invoked a C2 primitive directly. Map them
            // conservatively rather than panic.
            ServerError::Core(CoreError::Conflict { conflicting_file, conflicting_user }) => (
                StatusCode::CONFLICT,
                "CONFLICT",
                format!("{conflicting_file} is locked by {conflicting_user}"),
                None,
            ),
            ServerError::Core(CoreError::Staleness { remote_head, agent_head }) => (
                StatusCode::CONFLICT,
                "STALE",
                format!("remote head {remote_head} != agent head {agent_head}"),
                None,
            ),
            ServerError::Core(CoreError::Unauthenticated) => (
                StatusCode::UNAUTHORIZED,
                "UNAUTHENTICATED",
                "unauthenticated".to_string(),
                None,
            ),
            ServerError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone(), None),
            ServerError::Unauthenticated => (
                StatusCode::UNAUTHORIZED,
                "UNAUTHENTICATED",
                "unauthenticated".to_string(),
                None,
            ),
        };

        (
            status,
            Json(ErrorResponse {
                code,
                error: message,
                retry_after_ms,
            }),
        )
            .into_response()
    }
}
