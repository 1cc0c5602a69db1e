//! Keyway service
//!
//! Entry point for applications: resolves a domain by name and runs the
//! attempt through the [`DomainAuthenticator`].

use keyway_core::config::KeywayConfig;
use keyway_core::types::{AuthOutcome, DirectoryIdentity, Event, EventPayload};
use keyway_core::{Error, Result};
use keyway_metadata::LocalRecordStore;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::authenticator::DomainAuthenticator;
use crate::directory::DirectoryConnector;
use crate::events::{EventBus, LogListener};
use crate::registry::{DomainProbe, DomainRegistry};
use crate::validation::RuleRegistry;

pub struct Keyway {
    registry: Arc<DomainRegistry>,
    authenticator: DomainAuthenticator,
}

impl Keyway {
    pub fn new(registry: Arc<DomainRegistry>, authenticator: DomainAuthenticator) -> Self {
        Self {
            registry,
            authenticator,
        }
    }

    /// Build the registry from configuration.
    ///
    /// `events` receives any listeners the application registered; a
    /// [`LogListener`] is added for every event kind when `logging.events` is set.
    pub fn from_config(
        config: &KeywayConfig,
        connector: Arc<dyn DirectoryConnector>,
        store: Option<Arc<dyn LocalRecordStore>>,
        rules: &RuleRegistry,
        mut events: EventBus,
    ) -> Result<Self> {
        let registry = DomainRegistry::from_config(config, rules)?;

        if config.logging.events {
            events.listen_all(LogListener);
        }

        let mut authenticator = DomainAuthenticator::new(connector, Arc::new(events));
        if let Some(store) = store {
            authenticator = authenticator.with_store(store);
        }

        info!("Keyway {} ready with {} domain(s)", keyway_core::VERSION, registry.len());
        Ok(Self::new(Arc::new(registry), authenticator))
    }

    pub fn registry(&self) -> &Arc<DomainRegistry> {
        &self.registry
    }

    pub fn authenticator(&self) -> &DomainAuthenticator {
        &self.authenticator
    }

    pub async fn authenticate(
        &self,
        domain: &str,
        username: &str,
        credential: &str,
    ) -> AuthOutcome {
        let cancel = CancellationToken::new();
        self.authenticate_with_cancellation(domain, username, credential, &cancel)
            .await
    }

    pub async fn authenticate_with_cancellation(
        &self,
        domain: &str,
        username: &str,
        credential: &str,
        cancel: &CancellationToken,
    ) -> AuthOutcome {
        match self.registry.get(domain) {
            Ok(resolved) => {
                self.authenticator
                    .authenticate_with_cancellation(&resolved, username, credential, cancel)
                    .await
            }
            Err(e) => self.unknown_domain(domain, username, e),
        }
    }

    /// Find a user's directory entry without checking a credential
    pub async fn retrieve_by_credentials(
        &self,
        domain: &str,
        username: &str,
    ) -> Result<Option<DirectoryIdentity>> {
        let resolved = self.registry.get(domain)?;
        self.authenticator.discover(&resolved, username).await
    }

    pub async fn retrieve_by_credentials_with_cancellation(
        &self,
        domain: &str,
        username: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<DirectoryIdentity>> {
        let resolved = self.registry.get(domain)?;
        self.authenticator
            .discover_with_cancellation(&resolved, username, cancel)
            .await
    }

    /// Check that every `auto_connect` domain's directory answers
    pub async fn probe(&self) -> Vec<DomainProbe> {
        self.registry
            .probe(self.authenticator.connector().as_ref())
            .await
    }

    fn unknown_domain(&self, domain: &str, username: &str, err: Error) -> AuthOutcome {
        error!("Authentication of {} failed: {}", username, err);

        let events = self.authenticator.events();
        events.publish(Event::new(domain, username, EventPayload::Authenticating));
        events.publish(Event::new(
            domain,
            username,
            EventPayload::AuthenticationFailed {
                dn: None,
                code: err.code(),
                reason: err.to_string(),
            },
        ));

        AuthOutcome::Failed(err)
    }
}
