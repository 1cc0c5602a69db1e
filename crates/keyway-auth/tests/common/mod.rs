//! Shared fixtures for the authentication tests

#![allow(dead_code)]

use keyway_auth::{
    DomainAuthenticator, Domain, DomainSettings, EventBus, EventRecorder, StaticDirectory,
};
use keyway_core::config::{AttributeMapping, ConnectionConfig, SyncConfig};
use keyway_core::types::DirectoryIdentity;
use keyway_metadata::{LocalRecordStore, MemoryRecordStore};
use std::sync::Arc;

pub const ALICE_DN: &str = "cn=alice,ou=users,dc=corp";
pub const BOB_DN: &str = "cn=bob,ou=users,dc=corp";

pub fn connection() -> ConnectionConfig {
    ConnectionConfig {
        base_dn: "dc=corp".to_string(),
        timeout_seconds: 1,
        ..Default::default()
    }
}

pub fn settings() -> DomainSettings {
    DomainSettings::new("corp", connection()).with_username_attribute("uid")
}

pub fn sync_config(create_missing: bool) -> SyncConfig {
    SyncConfig {
        create_missing,
        attributes: vec![
            AttributeMapping::new("email", "mail"),
            AttributeMapping::new("name", "displayName"),
        ],
        sync_passwords: false,
    }
}

pub fn unsynchronized() -> Domain {
    Domain::unsynchronized(settings())
}

pub fn synchronized(create_missing: bool) -> Domain {
    Domain::synchronized(settings(), sync_config(create_missing))
}

pub fn person(dn: &str, uid: &str) -> DirectoryIdentity {
    DirectoryIdentity::new(dn)
        .with_attribute("uid", [uid])
        .with_attribute("objectClass", ["top", "person"])
        .with_attribute("mail", [format!("{}@corp.example", uid)])
        .with_attribute("displayName", [uid.to_uppercase()])
        .with_attribute("memberOf", ["cn=staff,ou=groups,dc=corp"])
}

pub fn directory() -> StaticDirectory {
    StaticDirectory::new()
        .with_user(person(ALICE_DN, "alice"), "alice-secret")
        .with_user(person(BOB_DN, "bob"), "bob-secret")
}

/// Authenticator wired to an in-memory directory, store and event recorder
pub struct Harness {
    pub directory: StaticDirectory,
    pub store: Arc<MemoryRecordStore>,
    pub recorder: Arc<EventRecorder>,
    pub authenticator: DomainAuthenticator,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_bus(EventBus::new())
    }

    pub fn with_bus(mut bus: EventBus) -> Self {
        let directory = directory();
        let store = Arc::new(MemoryRecordStore::new());
        let recorder = Arc::new(EventRecorder::new());
        bus.listen_all_shared(recorder.clone());

        let authenticator = DomainAuthenticator::new(Arc::new(directory.clone()), Arc::new(bus))
            .with_store(store.clone());

        Self {
            directory,
            store,
            recorder,
            authenticator,
        }
    }

    /// Route the authenticator's record access through `wrap`, which is
    /// given the harness's memory store
    pub fn wrapping<S>(wrap: impl FnOnce(Arc<MemoryRecordStore>) -> S) -> Self
    where
        S: LocalRecordStore + 'static,
    {
        let mut harness = Self::new();
        harness.authenticator = harness
            .authenticator
            .with_store(Arc::new(wrap(harness.store.clone())));
        harness
    }
}
