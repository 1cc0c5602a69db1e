//! Directory authentication for Keyway
//!
//! Authenticates users against LDAP/Active Directory domains, applies
//! validation rules, and keeps local identity records in sync.

pub mod authenticator;
pub mod directory;
pub mod domain;
pub mod events;
pub mod ldap;
pub mod locator;
pub mod registry;
pub mod service;
pub mod sync;
pub mod validation;

pub use authenticator::DomainAuthenticator;
pub use directory::{
    DirectoryConnection, DirectoryConnector, DirectoryError, DirectoryStats, Filter,
    StaticDirectory,
};
pub use domain::{Domain, DomainSettings};
pub use events::{EventBus, EventListener, EventRecorder, LogListener};
pub use ldap::LdapDirectory;
pub use locator::{DomainUserLocator, LocateError};
pub use registry::{DomainProbe, DomainRegistry};
pub use service::Keyway;
pub use sync::{map_attributes, SyncError, SynchronizationPipeline};
pub use validation::{
    BoundRule, RuleFactory, RuleRegistry, RuleVerdict, ValidationOutcome, ValidationRule,
    ValidationRuleChain,
};

pub use keyway_core::types::{AuthOutcome, Rejection};
