//! Domain registry

use keyway_core::config::KeywayConfig;
use keyway_core::{Error, Result};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

use crate::directory::{DirectoryConnector, DirectoryError};
use crate::domain::Domain;
use crate::validation::RuleRegistry;

/// Named domains in registration order.
///
/// Populated at startup and then shared behind an `Arc`; lookups take no locks.
#[derive(Debug, Default)]
pub struct DomainRegistry {
    domains: HashMap<String, Arc<Domain>>,
    order: Vec<String>,
}

/// Result of probing one domain's directory
#[derive(Debug, Clone)]
pub struct DomainProbe {
    pub domain: String,
    pub result: std::result::Result<(), DirectoryError>,
}

impl DomainProbe {
    pub fn is_reachable(&self) -> bool {
        self.result.is_ok()
    }
}

impl DomainRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &KeywayConfig, rules: &RuleRegistry) -> Result<Self> {
        config.validate()?;

        let mut registry = Self::new();
        for domain in &config.domains {
            registry.register(Domain::from_config(domain, rules)?);
        }

        Ok(registry)
    }

    /// Register a domain under its name. A domain already registered under
    /// that name is replaced and returned; the name keeps its position.
    pub fn register(&mut self, domain: Domain) -> Option<Arc<Domain>> {
        let name = domain.name().to_string();
        let previous = self.domains.insert(name.clone(), Arc::new(domain));

        if previous.is_some() {
            warn!("Domain {} re-registered; replacing previous definition", name);
        } else {
            self.order.push(name);
        }

        previous
    }

    pub fn get(&self, name: &str) -> Result<Arc<Domain>> {
        self.domains
            .get(name)
            .cloned()
            .ok_or_else(|| Error::UnknownDomain(name.to_string()))
    }

    /// Registered names, in registration order
    pub fn all(&self) -> &[String] {
        &self.order
    }

    /// Registered domains, in registration order
    pub fn domains(&self) -> impl Iterator<Item = &Arc<Domain>> {
        self.order.iter().filter_map(|name| self.domains.get(name))
    }

    /// The first registered domain
    pub fn default_domain(&self) -> Option<Arc<Domain>> {
        self.domains().next().cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.domains.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Open and close a connection for every `auto_connect` domain.
    ///
    /// The connections are not kept; each authentication attempt opens its own.
    pub async fn probe(&self, connector: &dyn DirectoryConnector) -> Vec<DomainProbe> {
        let mut probes = Vec::new();

        for domain in self.domains().filter(|d| d.settings().auto_connect) {
            let settings = domain.settings();
            let result = match connector.open(&settings.connection).await {
                Ok(mut conn) => conn.close().await,
                Err(e) => Err(e),
            };

            match &result {
                Ok(()) => info!("Domain {} directory is reachable", settings.name),
                Err(e) => warn!("Domain {} directory probe failed: {}", settings.name, e),
            }

            probes.push(DomainProbe {
                domain: settings.name.clone(),
                result,
            });
        }

        probes
    }
}
