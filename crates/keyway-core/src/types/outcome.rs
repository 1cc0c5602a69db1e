//! Authentication outcome types

use thiserror::Error;

use super::{DirectoryIdentity, LocalRecord};
use crate::error::{Error, ErrorKind};

/// Why an attempt was refused. Safe to log; not meant for end users.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    #[error("No directory entry matches the username")]
    UserNotFound,

    #[error("Username matched {count} directory entries")]
    AmbiguousUser { count: usize },

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Account disabled")]
    AccountDisabled,

    #[error("Rule {rule} failed: {reason}")]
    RuleFailed { rule: String, reason: String },

    #[error("No local record exists and the domain does not create one")]
    NoDatabaseRecord,

    #[error("The local record has been deleted")]
    RecordTrashed,
}

impl Rejection {
    pub fn code(&self) -> &'static str {
        match self {
            Rejection::UserNotFound => "UserNotFound",
            Rejection::AmbiguousUser { .. } => "AmbiguousUser",
            Rejection::InvalidCredentials => "InvalidCredentials",
            Rejection::AccountDisabled => "AccountDisabled",
            Rejection::RuleFailed { .. } => "RuleFailed",
            Rejection::NoDatabaseRecord => "NoDatabaseRecord",
            Rejection::RecordTrashed => "RecordTrashed",
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Rejection::UserNotFound
            | Rejection::InvalidCredentials
            | Rejection::AccountDisabled => ErrorKind::Credential,
            Rejection::AmbiguousUser { .. } => ErrorKind::Configuration,
            Rejection::RuleFailed { .. }
            | Rejection::NoDatabaseRecord
            | Rejection::RecordTrashed => ErrorKind::Validation,
        }
    }
}

/// Terminal result of one authentication attempt
#[derive(Debug)]
pub enum AuthOutcome {
    Successful {
        identity: DirectoryIdentity,
        /// Present for synchronized domains
        record: Option<LocalRecord>,
    },
    Rejected(Rejection),
    Failed(Error),
}

pub const GENERIC_REJECTION_MESSAGE: &str = "These credentials do not match our records.";
pub const GENERIC_FAILURE_MESSAGE: &str =
    "Authentication is temporarily unavailable. Please try again later.";

impl AuthOutcome {
    pub fn is_successful(&self) -> bool {
        matches!(self, AuthOutcome::Successful { .. })
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self, AuthOutcome::Rejected(_))
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, AuthOutcome::Failed(_))
    }

    pub fn identity(&self) -> Option<&DirectoryIdentity> {
        match self {
            AuthOutcome::Successful { identity, .. } => Some(identity),
            _ => None,
        }
    }

    pub fn record(&self) -> Option<&LocalRecord> {
        match self {
            AuthOutcome::Successful { record, .. } => record.as_ref(),
            _ => None,
        }
    }

    pub fn rejection(&self) -> Option<&Rejection> {
        match self {
            AuthOutcome::Rejected(rejection) => Some(rejection),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&Error> {
        match self {
            AuthOutcome::Failed(error) => Some(error),
            _ => None,
        }
    }

    /// Machine-readable reason for a non-successful outcome
    pub fn code(&self) -> Option<&'static str> {
        match self {
            AuthOutcome::Successful { .. } => None,
            AuthOutcome::Rejected(rejection) => Some(rejection.code()),
            AuthOutcome::Failed(error) => Some(error.code()),
        }
    }

    /// Message that can be shown to the user without revealing which factor failed
    pub fn user_message(&self) -> Option<&'static str> {
        match self {
            AuthOutcome::Successful { .. } => None,
            AuthOutcome::Rejected(_) => Some(GENERIC_REJECTION_MESSAGE),
            AuthOutcome::Failed(_) => Some(GENERIC_FAILURE_MESSAGE),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejection_messages_are_generic() {
        let wrong_password = AuthOutcome::Rejected(Rejection::InvalidCredentials);
        let no_user = AuthOutcome::Rejected(Rejection::UserNotFound);

        assert_eq!(wrong_password.user_message(), no_user.user_message());
        assert_eq!(wrong_password.code(), Some("InvalidCredentials"));
        assert_eq!(no_user.code(), Some("UserNotFound"));
    }

    #[test]
    fn test_failure_is_not_a_rejection() {
        let outcome = AuthOutcome::Failed(Error::Connectivity("refused".into()));

        assert!(outcome.is_failed());
        assert!(!outcome.is_rejected());
        assert_eq!(outcome.user_message(), Some(GENERIC_FAILURE_MESSAGE));
        assert_eq!(outcome.code(), Some("DirectoryUnreachable"));
    }

    #[test]
    fn test_rejection_kinds() {
        assert_eq!(Rejection::AccountDisabled.kind(), ErrorKind::Credential);
        assert_eq!(
            Rejection::RuleFailed {
                rule: "member_of".into(),
                reason: "not a member".into()
            }
            .kind(),
            ErrorKind::Validation
        );
    }
}
