//! Error types for the sync client.

use thiserror::Error;

/// Failure of a single network call.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connection, TLS, or protocol failure reported by the HTTP client.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// The server answered with a non-success status.
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// The response body could not be decoded.
    #[error("undecodable response body: {0}")]
    Decode(String),

    /// No response arrived within the request timeout.
    #[error("request timed out after {0:?}")]
    TimedOut(std::time::Duration),
}

/// Why a client action failed.
///
/// Every kind is terminal for the action that produced it; none are retried.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Local input validation failed; nothing was sent.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// No connectivity; nothing was sent.
    #[error("offline: cannot reach the ledger")]
    Unreachable,

    /// The server answered but the body lacks the expected numeric field.
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// The network call itself failed.
    #[error("transport failure: {0}")]
    TransportFailure(#[from] TransportError),
}

impl SyncError {
    /// `true` for failures detected before any request was attempted.
    pub fn is_local(&self) -> bool {
        matches!(self, Self::InvalidArgument(_) | Self::Unreachable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_kinds() {
        assert!(SyncError::InvalidArgument("x".into()).is_local());
        assert!(SyncError::Unreachable.is_local());
        assert!(!SyncError::MalformedResponse("x".into()).is_local());
        let timed_out = TransportError::TimedOut(std::time::Duration::from_secs(1));
        assert!(!SyncError::from(timed_out).is_local());
    }

    #[test]
    fn status_error_display() {
        let err = TransportError::Status {
            status: 400,
            body: "{\"error\":\"bad_request\"}".to_string(),
        };
        let msg = SyncError::from(err).to_string();
        assert!(msg.contains("HTTP 400"));
        assert!(msg.contains("bad_request"));
    }
}
