//! Domain model
//!
//! A domain is one configured directory plus the rules for authenticating
//! against it. Synchronized domains also keep a local record per user.

use keyway_core::config::{
    AmbiguousUserPolicy, ConnectionConfig, DomainConfig, SyncConfig,
};
use keyway_core::{Error, Result};

use crate::directory::Filter;
use crate::validation::{BoundRule, RuleRegistry};

/// Settings shared by both kinds of domain
#[derive(Debug, Clone)]
pub struct DomainSettings {
    pub name: String,
    pub connection: ConnectionConfig,
    /// Directory attribute matched against the login username
    pub auth_username_attribute: String,
    /// Filters ANDed into every user search
    pub auth_scopes: Vec<Filter>,
    /// Validation rules in evaluation order
    pub auth_rules: Vec<BoundRule>,
    /// Probe the directory at startup
    pub auto_connect: bool,
    pub on_ambiguous_user: AmbiguousUserPolicy,
}

impl DomainSettings {
    pub fn new(name: &str, connection: ConnectionConfig) -> Self {
        Self {
            name: name.to_string(),
            connection,
            auth_username_attribute: keyway_core::DEFAULT_AUTH_USERNAME_ATTRIBUTE.to_string(),
            auth_scopes: Vec::new(),
            auth_rules: Vec::new(),
            auto_connect: true,
            on_ambiguous_user: AmbiguousUserPolicy::default(),
        }
    }

    pub fn with_username_attribute(mut self, attribute: &str) -> Self {
        self.auth_username_attribute = attribute.to_string();
        self
    }

    pub fn with_scope(mut self, scope: Filter) -> Self {
        self.auth_scopes.push(scope);
        self
    }

    pub fn with_rule(mut self, rule: BoundRule) -> Self {
        self.auth_rules.push(rule);
        self
    }

    pub fn with_ambiguity_policy(mut self, policy: AmbiguousUserPolicy) -> Self {
        self.on_ambiguous_user = policy;
        self
    }

    pub fn without_auto_connect(mut self) -> Self {
        self.auto_connect = false;
        self
    }
}

#[derive(Debug, Clone)]
pub enum Domain {
    /// Authenticates against the directory only
    Unsynchronized(DomainSettings),
    /// Also maintains a local record for every user that signs in
    Synchronized {
        settings: DomainSettings,
        sync: SyncConfig,
    },
}

impl Domain {
    pub fn unsynchronized(settings: DomainSettings) -> Self {
        Domain::Unsynchronized(settings)
    }

    pub fn synchronized(settings: DomainSettings, sync: SyncConfig) -> Self {
        Domain::Synchronized { settings, sync }
    }

    /// Build a domain, resolving scope filters and rule identifiers
    pub fn from_config(config: &DomainConfig, rules: &RuleRegistry) -> Result<Self> {
        config.validate()?;

        let auth_scopes = config
            .auth_scopes
            .iter()
            .map(|scope| Filter::parse(scope))
            .collect::<Result<Vec<_>>>()
            .map_err(|e| match e {
                Error::InvalidFilter(message) => Error::InvalidFilter(format!(
                    "Domain {} auth scope: {}",
                    config.name, message
                )),
                other => other,
            })?;

        let auth_rules = config
            .auth_rules
            .iter()
            .map(|rule| rules.bind(rule))
            .collect::<Result<Vec<_>>>()?;

        let settings = DomainSettings {
            name: config.name.clone(),
            connection: config.connection.clone(),
            auth_username_attribute: config.auth_username_attribute.clone(),
            auth_scopes,
            auth_rules,
            auto_connect: config.auto_connect,
            on_ambiguous_user: config.on_ambiguous_user,
        };

        Ok(match &config.sync {
            Some(sync) => Domain::Synchronized {
                settings,
                sync: sync.clone(),
            },
            None => Domain::Unsynchronized(settings),
        })
    }

    pub fn name(&self) -> &str {
        &self.settings().name
    }

    pub fn settings(&self) -> &DomainSettings {
        match self {
            Domain::Unsynchronized(settings) => settings,
            Domain::Synchronized { settings, .. } => settings,
        }
    }

    pub fn sync(&self) -> Option<&SyncConfig> {
        match self {
            Domain::Unsynchronized(_) => None,
            Domain::Synchronized { sync, .. } => Some(sync),
        }
    }

    pub fn is_synchronized(&self) -> bool {
        self.sync().is_some()
    }
}
