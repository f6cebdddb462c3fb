//! Error types for the device ledger.

use thiserror::Error;

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, LedgerError>;

/// Errors returned by ledger validation and mutation.
///
/// Every variant is raised before the store is changed, so a failed call
/// never leaves a partially applied mutation behind.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// A caller-supplied field is missing or malformed.
    #[error("invalid argument '{field}': {reason}")]
    InvalidArgument {
        /// Name of the offending field as it appears on the wire.
        field: &'static str,
        /// Description of what's wrong.
        reason: String,
    },

    /// Applying the increment would overflow the device total.
    #[error("total for device {device_id} would overflow")]
    Overflow {
        /// Device whose total is saturated.
        device_id: String,
    },

    /// A request id was reused for a different mutation on the same device.
    #[error("request id {request_id} was already used for a different mutation")]
    RequestIdConflict {
        /// The reused request id.
        request_id: String,
    },
}

impl LedgerError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            field,
            reason: reason.into(),
        }
    }

    /// Short machine-readable label, used for metrics and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidArgument { .. } => "invalid_argument",
            Self::Overflow { .. } => "overflow",
            Self::RequestIdConflict { .. } => "request_id_conflict",
        }
    }
}
