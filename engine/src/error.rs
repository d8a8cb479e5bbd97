//! Error types for the emergency request lifecycle.

use crate::types::{Email, ResponseStatus};
use bloodbridge_runtime::StoreError;
use thiserror::Error;

/// Coarse error category reported to callers
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Missing or malformed input, or an illegal transition
    Validation,
    /// Referenced request, donor or ledger entry is absent
    NotFound,
    /// Caller lacks the required role or approval
    Unauthorized,
    /// Response arrived after the response window closed
    WindowExpired,
    /// Notification could not be delivered (never aborts an operation)
    DeliveryFailure,
}

/// Rejection of a single lifecycle operation.
///
/// A rejected operation has no side effects: nothing is written and nothing
/// is sent.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LifecycleError {
    /// Missing or malformed input, or an illegal transition
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Referenced record is absent
    #[error("{0} not found")]
    NotFound(String),

    /// Caller lacks the required role or approval
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Response arrived after the response window closed
    #[error("Response window expired ({elapsed_secs}s since notification, limit {window_secs}s)")]
    WindowExpired {
        /// Whole seconds since activation
        elapsed_secs: i64,
        /// Window length in seconds
        window_secs: i64,
    },

    /// Donor already holds a ledger entry for this request
    #[error("{donor} already responded to this request ({status})")]
    AlreadyResponded {
        /// Responding donor
        donor: Email,
        /// Status already on file
        status: ResponseStatus,
    },
}

impl LifecycleError {
    /// Category of this error
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) | Self::AlreadyResponded { .. } => ErrorKind::Validation,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Unauthorized(_) => ErrorKind::Unauthorized,
            Self::WindowExpired { .. } => ErrorKind::WindowExpired,
        }
    }
}

/// Errors returned by the [`crate::app::BloodBridge`] facade
#[derive(Error, Debug)]
pub enum ServiceError {
    /// The operation was rejected
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    /// The record store failed
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// A follow-up write to another table failed and the operation's own
    /// change was compensated; the operation can be retried
    #[error("{operation} rolled back: {reason}")]
    RolledBack {
        /// Operation that was undone
        operation: &'static str,
        /// Why the follow-up failed
        reason: String,
    },
}

impl ServiceError {
    /// Category of a rejection; `None` for infrastructure failures
    #[must_use]
    pub const fn kind(&self) -> Option<ErrorKind> {
        match self {
            Self::Lifecycle(e) => Some(e.kind()),
            Self::Store(_) | Self::RolledBack { .. } => None,
        }
    }
}

/// Result alias for facade operations
pub type Result<T> = std::result::Result<T, ServiceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn already_responded_is_a_validation_error() {
        let error = LifecycleError::AlreadyResponded {
            donor: Email::from("a@b.c"),
            status: ResponseStatus::Declined,
        };
        assert_eq!(error.kind(), ErrorKind::Validation);
        assert_eq!(error.to_string(), "a@b.c already responded to this request (Declined)");
    }

    #[test]
    fn service_error_exposes_rejection_kind() {
        let error = ServiceError::from(LifecycleError::WindowExpired {
            elapsed_secs: 901,
            window_secs: 900,
        });
        assert_eq!(error.kind(), Some(ErrorKind::WindowExpired));
    }

    #[test]
    fn rolled_back_operations_are_infrastructure_failures() {
        let error = ServiceError::RolledBack {
            operation: "donation confirmation",
            reason: "disk full".to_string(),
        };
        assert_eq!(error.kind(), None);
        assert_eq!(error.to_string(), "donation confirmation rolled back: disk full");
    }
}
