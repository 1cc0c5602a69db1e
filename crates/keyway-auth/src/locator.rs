//! Directory user lookup

use keyway_core::types::DirectoryIdentity;
use thiserror::Error;
use tracing::debug;

use crate::directory::{DirectoryConnection, DirectoryError, Filter};
use crate::domain::Domain;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LocateError {
    #[error("No directory entry matches the username")]
    UserNotFound,

    #[error("Username matched {count} directory entries")]
    AmbiguousUser { count: usize },

    #[error(transparent)]
    Directory(#[from] DirectoryError),
}

/// Resolves a login username to exactly one directory entry
#[derive(Debug, Clone, Copy, Default)]
pub struct DomainUserLocator;

impl DomainUserLocator {
    pub fn new() -> Self {
        Self
    }

    /// `(auth_username_attribute=username)` ANDed with every auth scope
    pub fn search_filter(&self, domain: &Domain, username: &str) -> Filter {
        let settings = domain.settings();
        let mut filters = Vec::with_capacity(settings.auth_scopes.len() + 1);
        filters.push(Filter::eq(&settings.auth_username_attribute, username));
        filters.extend(settings.auth_scopes.iter().cloned());
        Filter::all(filters)
    }

    pub async fn locate(
        &self,
        domain: &Domain,
        username: &str,
        conn: &mut dyn DirectoryConnection,
    ) -> Result<DirectoryIdentity, LocateError> {
        let filter = self.search_filter(domain, username);
        let base = &domain.settings().connection.base_dn;

        debug!("Locating {} in {} with {}", username, domain.name(), filter);

        let mut entries = conn.search(base, &filter).await?;

        match entries.len() {
            0 => Err(LocateError::UserNotFound),
            1 => Ok(entries.remove(0)),
            count => Err(LocateError::AmbiguousUser { count }),
        }
    }
}
