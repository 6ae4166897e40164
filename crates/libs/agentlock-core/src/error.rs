use strum::AsRefStr;
use thiserror::Error;

/// Errors surfaced by the coordination core.
///
/// Variants map onto the six-category taxonomy: `Validation`, `Conflict`,
/// `Staleness`, `RemoteQuota`, `Transient`, `Corruption`. `Conflict` and
/// `Staleness` are business outcomes, not exceptional control flow — C5
/// (`coordination`) catches them internally and encodes them in the
/// orchestration command of a successful response rather than letting them
/// propagate to the HTTP layer. They exist as `Error` variants only so the
/// lower layers (C2) have a uniform way to short-circuit.
#[derive(Debug, Error, AsRefStr)]
pub enum Error {
    /// Missing, empty, or ill-typed request fields. Not retryable.
    #[error("validation error: {0}")]
    Validation(String),

    /// A requested file is already locked by a different, non-expired owner.
    #[error("file conflict on {conflicting_file}: held by {conflicting_user}")]
    Conflict {
        conflicting_file: String,
        conflicting_user: String,
    },

    /// The caller's claimed HEAD no longer matches the remote branch HEAD.
    #[error("stale: remote head {remote_head} != agent head {agent_head}")]
    Staleness {
        remote_head: String,
        agent_head: String,
    },

    /// The remote repository host rejected the call due to quota/rate limits.
    #[error("remote quota exhausted, retry after {retry_after_ms:?}ms")]
    RemoteQuota { retry_after_ms: Option<i64> },

    /// A transport-level failure against the key-value store or remote host.
    #[error("transient infrastructure error: {0}")]
    Transient(String),

    /// A persisted value could not be parsed. Callers treat the entry as
    /// absent; this variant exists so the failure is still observable in
    /// logs at the point of detection.
    #[error("corrupt persisted value at {key}: {detail}")]
    Corruption { key: String, detail: String },

    /// Authentication for the sweeper's shared-secret header failed.
    #[error("unauthenticated")]
    Unauthenticated,
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn corruption(key: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::Corruption {
            key: key.into(),
            detail: detail.into(),
        }
    }
}

impl From<redis::RedisError> for Error {
    fn from(err: redis::RedisError) -> Self {
        Error::Transient(err.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::Transient(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Corruption {
            key: String::new(),
            detail: err.to_string(),
        }
    }
}
