//! Local identity record types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Local identity record linked to a directory entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalRecord {
    pub id: Uuid,
    /// Domain the record was imported from
    pub domain: String,
    /// Distinguished name of the linked directory entry
    pub directory_dn: String,
    pub attributes: BTreeMap<String, String>,
    /// Salted digest of the last synchronized credential
    pub password_hash: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Set when the record has been soft-deleted
    pub deleted_at: Option<DateTime<Utc>>,
}

impl LocalRecord {
    pub fn from_new(new: NewLocalRecord) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            domain: new.domain,
            directory_dn: new.directory_dn,
            attributes: new.attributes,
            password_hash: new.password_hash,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    pub fn is_trashed(&self) -> bool {
        self.deleted_at.is_some()
    }

    pub fn get_attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(|s| s.as_str())
    }
}

/// Fields for a record that has not been persisted yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewLocalRecord {
    pub domain: String,
    pub directory_dn: String,
    pub attributes: BTreeMap<String, String>,
    pub password_hash: Option<String>,
}

impl NewLocalRecord {
    pub fn new(domain: impl Into<String>, directory_dn: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            directory_dn: directory_dn.into(),
            attributes: BTreeMap::new(),
            password_hash: None,
        }
    }
}
