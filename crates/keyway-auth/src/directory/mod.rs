//! Directory connection seam
//!
//! The authentication pipeline only needs four directory operations: open a
//! connection, search for entries, bind with a credential, and close. They are
//! expressed as the [`DirectoryConnector`] and [`DirectoryConnection`] traits so
//! the LDAP client can be swapped for the in-memory [`StaticDirectory`].

mod filter;
mod memory;

pub use filter::Filter;
pub use memory::{DirectoryStats, StaticDirectory};

use async_trait::async_trait;
use keyway_core::config::ConnectionConfig;
use keyway_core::types::DirectoryIdentity;
use keyway_core::Error;
use std::time::Duration;
use thiserror::Error;

/// Errors reported by a directory connection
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DirectoryError {
    /// The directory refused the credential
    #[error("Invalid credentials")]
    InvalidCredentials,

    /// The directory reports the account as disabled or locked
    #[error("Account disabled")]
    AccountDisabled,

    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("Directory {operation} timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Protocol error: {0}")]
    Protocol(String),
}

impl DirectoryError {
    /// Whether the directory rejected a credential, as opposed to failing to answer
    pub fn is_credential_rejection(&self) -> bool {
        matches!(
            self,
            DirectoryError::InvalidCredentials | DirectoryError::AccountDisabled
        )
    }
}

impl From<DirectoryError> for Error {
    /// Used outside the user bind. A credential rejection here means the
    /// service account was refused, which is a configuration problem.
    fn from(err: DirectoryError) -> Self {
        match err {
            DirectoryError::InvalidCredentials | DirectoryError::AccountDisabled => {
                Error::InvalidConfig(format!("Directory refused the service account: {}", err))
            }
            DirectoryError::Connect(message) => Error::Connectivity(message),
            DirectoryError::Timeout { operation, after } => Error::Timeout { operation, after },
            DirectoryError::Cancelled => Error::Cancelled,
            DirectoryError::Protocol(message) => Error::Protocol(message),
        }
    }
}

/// Opens directory connections for a domain
#[async_trait]
pub trait DirectoryConnector: Send + Sync {
    async fn open(
        &self,
        config: &ConnectionConfig,
    ) -> Result<Box<dyn DirectoryConnection>, DirectoryError>;
}

/// One open connection, leased to a single authentication attempt
#[async_trait]
pub trait DirectoryConnection: Send {
    /// Subtree search under `base`
    async fn search(
        &mut self,
        base: &str,
        filter: &Filter,
    ) -> Result<Vec<DirectoryIdentity>, DirectoryError>;

    /// Verify a credential by binding as `dn`
    async fn bind(&mut self, dn: &str, credential: &str) -> Result<(), DirectoryError>;

    async fn close(&mut self) -> Result<(), DirectoryError>;
}
