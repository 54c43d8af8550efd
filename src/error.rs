//! Failure taxonomy for the conversation store and external collaborators.
//!
//! Persistence failures are sentinels: callers degrade to "no persistence"
//! and the turn still produces a reply. Upstream failures carry a user-safe
//! message; raw transport detail is logged, never shown.

use thiserror::Error;

/// Failure appending a message record.
#[derive(Debug, Error)]
pub enum AppendError {
    /// Malformed input. Never retried, never written.
    #[error("invalid message: {0}")]
    Validation(&'static str),

    /// Backing store unreachable or misconfigured.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Raw document-store failure. Backends map their native errors here.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Failure updating a conversation summary.
///
/// Always soft: the message append has already succeeded independently, so
/// exhaustion only leaves the summary stale.
#[derive(Debug, Error)]
pub enum TouchError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("conditional write lost {attempts} consecutive conflicts")]
    RetryExhausted { attempts: u32 },
}

impl From<StoreError> for TouchError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Unavailable(detail) => Self::Unavailable(detail),
        }
    }
}

/// Failure calling an external collaborator over HTTP.
#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("{service} timed out after {secs}s")]
    Timeout { service: &'static str, secs: u64 },

    #[error("{service} returned status {status}")]
    Status { service: &'static str, status: u16 },

    #[error("{service} transport error: {detail}")]
    Transport { service: &'static str, detail: String },
}

impl UpstreamError {
    pub fn service(&self) -> &'static str {
        match self {
            Self::Timeout { service, .. }
            | Self::Status { service, .. }
            | Self::Transport { service, .. } => service,
        }
    }

    /// Short user-facing message. No status codes, no transport detail.
    pub fn user_message(&self) -> String {
        format!(
            "The {} is unavailable right now. Please try again in a moment.",
            self.service()
        )
    }
}
