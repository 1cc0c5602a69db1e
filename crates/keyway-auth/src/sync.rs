//! Local record synchronization

use chrono::Utc;
use keyway_core::config::{AttributeMapping, SyncConfig};
use keyway_core::types::{
    DirectoryIdentity, Event, EventPayload, LocalRecord, NewLocalRecord,
};
use keyway_core::Error;
use keyway_crypto::{hash_secret, verify_secret};
use keyway_metadata::LocalRecordStore;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

use crate::domain::Domain;
use crate::events::EventBus;

#[derive(Error, Debug)]
pub enum SyncError {
    /// No record exists and the domain does not create one
    #[error("No local record exists and the domain does not create one")]
    NoDatabaseRecord,

    #[error(transparent)]
    Failed(#[from] Error),
}

/// Resolve mapped fields from a directory entry.
///
/// For each local field the first mapping, in configured order, whose
/// directory attribute has a non-blank value wins. Fields with no value are
/// left out.
pub fn map_attributes(
    mappings: &[AttributeMapping],
    identity: &DirectoryIdentity,
) -> BTreeMap<String, String> {
    let mut mapped = BTreeMap::new();

    for mapping in mappings {
        if mapped.contains_key(&mapping.local) {
            continue;
        }
        if let Some(value) = identity.first_non_empty(&mapping.directory) {
            mapped.insert(mapping.local.clone(), value.to_string());
        }
    }

    mapped
}

/// Overwrite the mapped fields of `record`. Returns whether anything changed.
fn apply_attributes(
    record: &mut LocalRecord,
    mappings: &[AttributeMapping],
    mapped: &BTreeMap<String, String>,
) -> bool {
    let mut changed = false;

    for mapping in mappings {
        let local = &mapping.local;
        match mapped.get(local) {
            Some(value) => {
                if record.attributes.get(local) != Some(value) {
                    record.attributes.insert(local.clone(), value.clone());
                    changed = true;
                }
            }
            None => {
                changed |= record.attributes.remove(local).is_some();
            }
        }
    }

    changed
}

fn digest(credential: &str) -> Result<String, Error> {
    hash_secret(credential).map_err(|e| Error::InternalError(format!("Failed to hash password: {e}")))
}

/// Replace the stored digest unless it already matches the credential
fn apply_password(record: &mut LocalRecord, credential: &str) -> Result<bool, Error> {
    match &record.password_hash {
        Some(stored) if verify_secret(credential, stored) => Ok(false),
        _ => {
            record.password_hash = Some(digest(credential)?);
            Ok(true)
        }
    }
}

/// Creates or refreshes the local record of an authenticated identity
pub struct SynchronizationPipeline {
    store: Arc<dyn LocalRecordStore>,
    events: Arc<EventBus>,
}

impl SynchronizationPipeline {
    pub fn new(store: Arc<dyn LocalRecordStore>, events: Arc<EventBus>) -> Self {
        Self { store, events }
    }

    pub async fn synchronize(
        &self,
        domain: &Domain,
        username: &str,
        identity: &DirectoryIdentity,
        existing: Option<LocalRecord>,
        credential: Option<&str>,
    ) -> Result<LocalRecord, SyncError> {
        let sync = domain.sync().ok_or_else(|| {
            Error::InvalidConfig(format!("Domain {} is not synchronized", domain.name()))
        })?;

        let mapped = map_attributes(&sync.attributes, identity);
        let credential = credential.filter(|_| sync.sync_passwords);

        match existing {
            Some(record) => {
                self.update(domain, username, sync, identity, record, mapped, credential)
                    .await
            }
            None if sync.create_missing => {
                self.create(domain, username, sync, identity, mapped, credential)
                    .await
            }
            None => Err(SyncError::NoDatabaseRecord),
        }
    }

    /// Import a new record. A concurrent attempt may have imported the same
    /// identity since the caller's lookup; that record is refreshed instead.
    async fn create(
        &self,
        domain: &Domain,
        username: &str,
        sync: &SyncConfig,
        identity: &DirectoryIdentity,
        mapped: BTreeMap<String, String>,
        credential: Option<&str>,
    ) -> Result<LocalRecord, SyncError> {
        self.publish(
            domain,
            username,
            EventPayload::Importing {
                dn: identity.dn.clone(),
            },
        );

        let mut new = NewLocalRecord::new(domain.name(), identity.dn.clone());
        new.attributes = mapped.clone();
        new.password_hash = credential.map(digest).transpose()?;

        let record = match self.store.create(new).await {
            Ok(record) => record,
            Err(err) => {
                let Some(existing) = self
                    .store
                    .find_by_directory_identity(domain.name(), &identity.dn)
                    .await?
                else {
                    return Err(err.into());
                };
                debug!(
                    "{} was imported concurrently as {}, updating instead",
                    identity.dn, existing.id
                );
                return self
                    .update(domain, username, sync, identity, existing, mapped, credential)
                    .await;
            }
        };
        info!("Imported {} into domain {} as {}", identity.dn, domain.name(), record.id);

        self.publish(
            domain,
            username,
            EventPayload::Synchronized {
                record: record.clone(),
                created: true,
            },
        );

        Ok(record)
    }

    #[allow(clippy::too_many_arguments)]
    async fn update(
        &self,
        domain: &Domain,
        username: &str,
        sync: &SyncConfig,
        identity: &DirectoryIdentity,
        mut record: LocalRecord,
        mapped: BTreeMap<String, String>,
        credential: Option<&str>,
    ) -> Result<LocalRecord, SyncError> {
        self.publish(
            domain,
            username,
            EventPayload::Synchronizing {
                record_id: record.id,
                dn: identity.dn.clone(),
            },
        );

        let mut changed = apply_attributes(&mut record, &sync.attributes, &mapped);
        if let Some(credential) = credential {
            changed |= apply_password(&mut record, credential)?;
        }
        if record.directory_dn != identity.dn {
            record.directory_dn = identity.dn.clone();
            changed = true;
        }

        if changed {
            record.updated_at = Utc::now();
            self.store.save(&record).await?;
            debug!("Updated local record {} from {}", record.id, identity.dn);
        } else {
            debug!("Local record {} is up to date", record.id);
        }

        self.publish(
            domain,
            username,
            EventPayload::Synchronized {
                record: record.clone(),
                created: false,
            },
        );

        Ok(record)
    }

    fn publish(&self, domain: &Domain, username: &str, payload: EventPayload) {
        self.events
            .publish(Event::new(domain.name(), username, payload));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::DomainSettings;
    use crate::events::EventRecorder;
    use keyway_core::config::ConnectionConfig;
    use keyway_core::types::EventKind;
    use keyway_metadata::MemoryRecordStore;

    fn bob() -> DirectoryIdentity {
        DirectoryIdentity::new("cn=bob,dc=corp")
            .with_attribute("mail", ["bob@corp"])
            .with_attribute("displayName", ["Bob"])
    }

    fn domain(create_missing: bool, sync_passwords: bool) -> Domain {
        Domain::synchronized(
            DomainSettings::new("corp", ConnectionConfig::default()),
            SyncConfig {
                create_missing,
                attributes: vec![
                    AttributeMapping::new("email", "mail"),
                    AttributeMapping::new("name", "displayName"),
                    AttributeMapping::new("name", "cn"),
                ],
                sync_passwords,
            },
        )
    }

    fn pipeline() -> (SynchronizationPipeline, Arc<MemoryRecordStore>, Arc<EventRecorder>) {
        let store = Arc::new(MemoryRecordStore::new());
        let recorder = Arc::new(EventRecorder::new());
        let mut bus = EventBus::new();
        bus.listen_all_shared(recorder.clone());
        (
            SynchronizationPipeline::new(store.clone(), Arc::new(bus)),
            store,
            recorder,
        )
    }

    #[test]
    fn test_first_non_empty_mapping_wins() {
        let mappings = vec![
            AttributeMapping::new("name", "displayName"),
            AttributeMapping::new("name", "cn"),
            AttributeMapping::new("phone", "telephoneNumber"),
        ];

        let blank = DirectoryIdentity::new("cn=bob,dc=corp")
            .with_attribute("displayname", [" "])
            .with_attribute("CN", ["bob"]);
        let mapped = map_attributes(&mappings, &blank);
        assert_eq!(mapped.get("name").map(String::as_str), Some("bob"));
        assert!(!mapped.contains_key("phone"));

        let mapped = map_attributes(&mappings, &bob());
        assert_eq!(mapped.get("name").map(String::as_str), Some("Bob"));
    }

    #[tokio::test]
    async fn test_import_on_first_login() {
        let (pipeline, store, recorder) = pipeline();

        let record = pipeline
            .synchronize(&domain(true, false), "bob", &bob(), None, Some("pw"))
            .await
            .unwrap();

        assert_eq!(record.get_attribute("email"), Some("bob@corp"));
        assert_eq!(record.get_attribute("name"), Some("Bob"));
        assert!(record.password_hash.is_none());
        assert_eq!(store.len(), 1);
        assert_eq!(
            recorder.kinds(),
            vec![EventKind::Importing, EventKind::Synchronized]
        );
    }

    #[tokio::test]
    async fn test_creation_disallowed() {
        let (pipeline, store, recorder) = pipeline();

        let err = pipeline
            .synchronize(&domain(false, false), "bob", &bob(), None, None)
            .await
            .unwrap_err();

        assert!(matches!(err, SyncError::NoDatabaseRecord));
        assert!(store.is_empty());
        assert!(recorder.events().is_empty());
    }

    #[tokio::test]
    async fn test_resync_is_idempotent() {
        let (pipeline, store, recorder) = pipeline();
        let domain = domain(true, false);

        let created = pipeline
            .synchronize(&domain, "bob", &bob(), None, None)
            .await
            .unwrap();
        let once = pipeline
            .synchronize(&domain, "bob", &bob(), Some(created.clone()), None)
            .await
            .unwrap();
        let twice = pipeline
            .synchronize(&domain, "bob", &bob(), Some(once.clone()), None)
            .await
            .unwrap();

        assert_eq!(once, created);
        assert_eq!(twice, once);
        assert_eq!(store.get(&created.id), Some(created));
        assert_eq!(recorder.count(EventKind::Synchronizing), 2);
    }

    #[tokio::test]
    async fn test_directory_overwrites_mapped_fields() {
        let (pipeline, store, _) = pipeline();
        let domain = domain(true, false);

        let mut record = pipeline
            .synchronize(&domain, "bob", &bob(), None, None)
            .await
            .unwrap();
        record
            .attributes
            .insert("nickname".to_string(), "bobby".to_string());
        store.save(&record).await.unwrap();

        let moved = DirectoryIdentity::new("cn=bob,dc=corp").with_attribute("mail", ["robert@corp"]);
        let updated = pipeline
            .synchronize(&domain, "bob", &moved, Some(record.clone()), None)
            .await
            .unwrap();

        assert_eq!(updated.get_attribute("email"), Some("robert@corp"));
        assert_eq!(updated.get_attribute("name"), None);
        assert_eq!(updated.get_attribute("nickname"), Some("bobby"));
        assert!(updated.updated_at >= record.updated_at);
        assert_eq!(store.get(&record.id), Some(updated));
    }

    #[tokio::test]
    async fn test_password_digest_only_changes_with_credential() {
        let (pipeline, _, _) = pipeline();
        let domain = domain(true, true);

        let created = pipeline
            .synchronize(&domain, "bob", &bob(), None, Some("first"))
            .await
            .unwrap();
        let digest = created.password_hash.clone().unwrap();
        assert!(verify_secret("first", &digest));

        let same = pipeline
            .synchronize(&domain, "bob", &bob(), Some(created.clone()), Some("first"))
            .await
            .unwrap();
        assert_eq!(same.password_hash.as_deref(), Some(digest.as_str()));

        let rotated = pipeline
            .synchronize(&domain, "bob", &bob(), Some(same), Some("second"))
            .await
            .unwrap();
        assert!(verify_secret("second", rotated.password_hash.as_deref().unwrap()));
    }

    #[tokio::test]
    async fn test_concurrent_import_refreshes_existing_record() {
        let (pipeline, store, recorder) = pipeline();
        let domain = domain(true, false);

        let imported = pipeline
            .synchronize(&domain, "bob", &bob(), None, None)
            .await
            .unwrap();
        recorder.clear();

        // lookup raced with the import above and saw nothing
        let record = pipeline
            .synchronize(&domain, "bob", &bob(), None, None)
            .await
            .unwrap();

        assert_eq!(record.id, imported.id);
        assert_eq!(store.len(), 1);
        assert_eq!(
            recorder.kinds(),
            vec![
                EventKind::Importing,
                EventKind::Synchronizing,
                EventKind::Synchronized
            ]
        );
    }
}
