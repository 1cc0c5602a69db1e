//! In-memory record store

use async_trait::async_trait;
use keyway_core::types::{LocalRecord, NewLocalRecord};
use keyway_core::{Error, Result};
use parking_lot::RwLock;
use std::collections::HashMap;
use tracing::debug;
use uuid::Uuid;

use crate::traits::{dn_key, LocalRecordStore};

/// Record store backed by a map, for tests and single-process deployments
#[derive(Default)]
pub struct MemoryRecordStore {
    records: RwLock<HashMap<Uuid, LocalRecord>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    pub fn get(&self, id: &Uuid) -> Option<LocalRecord> {
        self.records.read().get(id).cloned()
    }
}

#[async_trait]
impl LocalRecordStore for MemoryRecordStore {
    async fn find_by_directory_identity(
        &self,
        domain: &str,
        dn: &str,
    ) -> Result<Option<LocalRecord>> {
        let key = dn_key(dn);
        Ok(self
            .records
            .read()
            .values()
            .find(|r| r.domain == domain && dn_key(&r.directory_dn) == key)
            .cloned())
    }

    async fn create(&self, record: NewLocalRecord) -> Result<LocalRecord> {
        let mut records = self.records.write();
        let key = dn_key(&record.directory_dn);

        if records
            .values()
            .any(|r| r.domain == record.domain && dn_key(&r.directory_dn) == key)
        {
            return Err(Error::DatabaseError(format!(
                "A local record for {} already exists in domain {}",
                record.directory_dn, record.domain
            )));
        }

        let record = LocalRecord::from_new(record);
        records.insert(record.id, record.clone());

        debug!("Created local record {} for {}", record.id, record.directory_dn);
        Ok(record)
    }

    async fn save(&self, record: &LocalRecord) -> Result<()> {
        let mut records = self.records.write();
        match records.get_mut(&record.id) {
            Some(existing) => {
                *existing = record.clone();
                Ok(())
            }
            None => Err(Error::DatabaseError(format!(
                "No local record with id {}",
                record.id
            ))),
        }
    }
}
