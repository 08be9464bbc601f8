//! Error types
//!
//! Transport failures come back from the platform client. Only the initial
//! post in `StreamSession::start` surfaces one to the caller; everything else
//! is logged and swallowed at the session boundary.

use std::time::Duration;

use thiserror::Error;

/// Failure reported by a platform client call
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// Platform refused the call because of its rate limit
    #[error("rate limited (retry after {retry_after:?})")]
    RateLimited { retry_after: Option<Duration> },

    /// Platform rejected the request (bad payload, missing permissions, ...)
    #[error("rejected with status {status}: {message}")]
    Rejected { status: u16, message: String },

    /// Connection could not be established or was dropped
    #[error("connection error: {0}")]
    Connection(String),

    /// Request did not complete in time
    #[error("request timed out")]
    Timeout,
}

impl TransportError {
    /// Whether a later attempt with the same payload could succeed
    pub fn is_transient(&self) -> bool {
        !matches!(self, TransportError::Rejected { .. })
    }
}

/// Errors returned from the public session API
#[derive(Debug, Error)]
pub enum SessionError {
    /// The primary message could not be posted, so the session cannot stream
    #[error("failed to post the primary message")]
    StartFailed(#[source] TransportError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(TransportError::Timeout.is_transient());
        assert!(TransportError::Connection("reset".into()).is_transient());
        assert!(TransportError::RateLimited { retry_after: None }.is_transient());
        assert!(!TransportError::Rejected {
            status: 400,
            message: "embed too large".into()
        }
        .is_transient());
    }

    #[test]
    fn test_start_failed_keeps_source() {
        use std::error::Error as _;

        let err = SessionError::StartFailed(TransportError::Timeout);
        assert_eq!(err.to_string(), "failed to post the primary message");
        assert_eq!(err.source().map(|s| s.to_string()), Some("request timed out".into()));
    }
}
