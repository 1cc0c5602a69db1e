//! Local record store trait
//!
//! Defines the narrow interface the authentication pipeline uses to read
//! and write local identity records.

use async_trait::async_trait;
use keyway_core::types::{LocalRecord, NewLocalRecord};
use keyway_core::Result;

/// Local record store trait
#[async_trait]
pub trait LocalRecordStore: Send + Sync {
    /// Find the record linked to a directory entry. Distinguished names
    /// compare case-insensitively.
    async fn find_by_directory_identity(
        &self,
        domain: &str,
        dn: &str,
    ) -> Result<Option<LocalRecord>>;

    /// Persist a new record and return it with its assigned id
    async fn create(&self, record: NewLocalRecord) -> Result<LocalRecord>;

    /// Overwrite an existing record
    async fn save(&self, record: &LocalRecord) -> Result<()>;
}

/// Lookup key for a directory entry within a domain
pub(crate) fn dn_key(dn: &str) -> String {
    dn.trim().to_lowercase()
}
