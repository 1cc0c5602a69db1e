//! Error types for Keyway

use std::time::Duration;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Broad error category, used to decide how a failure is surfaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Misconfigured domain or rule. Fatal to the request, not retryable.
    Configuration,
    /// Bad password or disabled account.
    Credential,
    /// Directory unreachable, timed out, or the attempt was cancelled.
    Connectivity,
    /// A configured validation rule rejected the identity.
    Validation,
    /// The local record store failed.
    Persistence,
    /// Anything else.
    Internal,
}

#[derive(Error, Debug)]
pub enum Error {
    // Configuration Errors
    #[error("Unknown domain: {0}")]
    UnknownDomain(String),

    #[error("Username {username} matched {count} directory entries")]
    AmbiguousUser { username: String, count: usize },

    #[error("Unknown validation rule: {0}")]
    UnknownRule(String),

    #[error("Invalid search filter: {0}")]
    InvalidFilter(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // Connectivity Errors
    #[error("Directory unreachable: {0}")]
    Connectivity(String),

    #[error("Directory {operation} timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    #[error("Authentication attempt was cancelled")]
    Cancelled,

    #[error("Directory protocol error: {0}")]
    Protocol(String),

    // Persistence Errors
    #[error("Database error: {0}")]
    DatabaseError(String),

    // Internal Errors
    #[error("Internal error: {0}")]
    InternalError(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    pub fn code(&self) -> &'static str {
        match self {
            Error::UnknownDomain(_) => "UnknownDomain",
            Error::AmbiguousUser { .. } => "AmbiguousUser",
            Error::UnknownRule(_) => "UnknownRule",
            Error::InvalidFilter(_) => "InvalidFilter",
            Error::InvalidConfig(_) => "InvalidConfig",
            Error::Connectivity(_) => "DirectoryUnreachable",
            Error::Timeout { .. } => "Timeout",
            Error::Cancelled => "Cancelled",
            Error::Protocol(_) => "DirectoryProtocolError",
            Error::DatabaseError(_) => "PersistenceError",
            Error::InternalError(_) => "InternalError",
            Error::Io(_) => "InternalError",
            Error::Other(_) => "InternalError",
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::UnknownDomain(_)
            | Error::AmbiguousUser { .. }
            | Error::UnknownRule(_)
            | Error::InvalidFilter(_)
            | Error::InvalidConfig(_) => ErrorKind::Configuration,

            Error::Connectivity(_)
            | Error::Timeout { .. }
            | Error::Cancelled
            | Error::Protocol(_) => ErrorKind::Connectivity,

            Error::DatabaseError(_) => ErrorKind::Persistence,

            _ => ErrorKind::Internal,
        }
    }

    /// Whether the caller may retry the whole attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::Connectivity | ErrorKind::Persistence
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_taxonomy() {
        assert_eq!(
            Error::UnknownDomain("corp".into()).kind(),
            ErrorKind::Configuration
        );
        assert_eq!(
            Error::AmbiguousUser {
                username: "alice".into(),
                count: 2
            }
            .kind(),
            ErrorKind::Configuration
        );
        assert_eq!(Error::Cancelled.kind(), ErrorKind::Connectivity);
        assert_eq!(
            Error::DatabaseError("locked".into()).kind(),
            ErrorKind::Persistence
        );
    }

    #[test]
    fn test_retryable() {
        assert!(Error::Connectivity("refused".into()).is_retryable());
        assert!(Error::Timeout {
            operation: "bind",
            after: Duration::from_secs(5)
        }
        .is_retryable());
        assert!(!Error::UnknownRule("nope".into()).is_retryable());
    }

    #[test]
    fn test_codes_are_stable() {
        assert_eq!(Error::UnknownDomain("x".into()).code(), "UnknownDomain");
        assert_eq!(Error::Protocol("x".into()).code(), "DirectoryProtocolError");
        assert_eq!(
            Error::Other(anyhow::anyhow!("boom")).code(),
            "InternalError"
        );
    }
}
