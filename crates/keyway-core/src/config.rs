//! Configuration for Keyway

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::warn;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KeywayConfig {
    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub domains: Vec<DomainConfig>,
}

impl KeywayConfig {
    pub fn from_file(path: &str) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| crate::Error::InvalidConfig(format!("Failed to read config: {}", e)))?;

        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> crate::Result<Self> {
        toml::from_str(content)
            .map_err(|e| crate::Error::InvalidConfig(format!("Failed to parse config: {}", e)))
    }

    /// Load from `KEYWAY_CONFIG` if set, then apply environment overrides.
    pub fn from_env() -> crate::Result<Self> {
        let _ = dotenvy::dotenv();

        let mut config = match std::env::var("KEYWAY_CONFIG") {
            Ok(path) => Self::from_file(&path)?,
            Err(_) => Self::default(),
        };

        if let Ok(level) = std::env::var("KEYWAY_LOG_LEVEL") {
            config.logging.level = level;
        }
        if let Ok(format) = std::env::var("KEYWAY_LOG_FORMAT") {
            config.logging.format = format;
        }
        if let Ok(events) = std::env::var("KEYWAY_LOG_EVENTS") {
            config.logging.events = events == "true";
        }

        Ok(config)
    }

    pub fn validate(&self) -> crate::Result<()> {
        let mut seen = HashSet::new();
        for domain in &self.domains {
            domain.validate()?;
            if !seen.insert(domain.name.as_str()) {
                warn!(
                    "Domain {} is configured more than once; the last definition wins",
                    domain.name
                );
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
    /// Attach a logging listener to every authentication event
    #[serde(default)]
    pub events: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            events: false,
        }
    }
}

/// Directory connection settings, handed to the directory connector untouched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// LDAP server URL (ldap:// or ldaps://)
    #[serde(default = "default_server_url")]
    pub server_url: String,

    /// Base DN that user searches are scoped to
    /// Example: "ou=users,dc=example,dc=com"
    #[serde(default)]
    pub base_dn: String,

    /// Service account used to search the directory
    #[serde(default)]
    pub bind_dn: String,

    #[serde(default)]
    pub bind_password: String,

    #[serde(default)]
    pub start_tls: bool,

    /// Skip TLS certificate verification (not recommended for production)
    #[serde(default)]
    pub skip_tls_verify: bool,

    /// Bound on connect, search and bind, in seconds
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
}

fn default_server_url() -> String {
    "ldap://localhost:389".to_string()
}

fn default_timeout() -> u64 {
    crate::DEFAULT_TIMEOUT_SECS
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            server_url: default_server_url(),
            base_dn: String::new(),
            bind_dn: String::new(),
            bind_password: String::new(),
            start_tls: false,
            skip_tls_verify: false,
            timeout_seconds: default_timeout(),
        }
    }
}

impl ConnectionConfig {
    pub fn timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.timeout_seconds)
    }

    pub fn validate(&self) -> crate::Result<()> {
        if self.server_url.is_empty() {
            return Err(crate::Error::InvalidConfig(
                "Server URL is required".into(),
            ));
        }

        if !self.server_url.starts_with("ldap://") && !self.server_url.starts_with("ldaps://") {
            return Err(crate::Error::InvalidConfig(
                "Server URL must start with ldap:// or ldaps://".into(),
            ));
        }

        if self.timeout_seconds == 0 {
            return Err(crate::Error::InvalidConfig(
                "Timeout must be at least one second".into(),
            ));
        }

        Ok(())
    }
}

/// What to do when a username matches more than one directory entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AmbiguousUserPolicy {
    /// Treat it as a configuration defect and fail the attempt
    #[default]
    Fail,
    /// Reject the attempt like an unknown user
    Reject,
}

/// One configured validation rule: an identifier plus optional arguments.
///
/// Accepts either a bare string (`"only_imported"`) or a table
/// (`{ id = "member_of", args = ["cn=staff,dc=corp"] }`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RuleConfigRepr")]
pub struct RuleConfig {
    pub id: String,
    #[serde(default)]
    pub args: Vec<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RuleConfigRepr {
    Id(String),
    Full {
        id: String,
        #[serde(default)]
        args: Vec<String>,
    },
}

impl From<RuleConfigRepr> for RuleConfig {
    fn from(repr: RuleConfigRepr) -> Self {
        match repr {
            RuleConfigRepr::Id(id) => Self { id, args: Vec::new() },
            RuleConfigRepr::Full { id, args } => Self { id, args },
        }
    }
}

impl From<&str> for RuleConfig {
    fn from(id: &str) -> Self {
        Self {
            id: id.to_string(),
            args: Vec::new(),
        }
    }
}

impl RuleConfig {
    pub fn with_args<I, S>(id: &str, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            id: id.to_string(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }
}

/// Maps one directory attribute onto one local record field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeMapping {
    pub local: String,
    pub directory: String,
}

impl AttributeMapping {
    pub fn new(local: &str, directory: &str) -> Self {
        Self {
            local: local.to_string(),
            directory: directory.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Create a local record on first login
    #[serde(default = "default_true")]
    pub create_missing: bool,

    /// Attribute mappings, applied in this order
    #[serde(default)]
    pub attributes: Vec<AttributeMapping>,

    /// Store a digest of the presented credential on the local record
    #[serde(default)]
    pub sync_passwords: bool,
}

fn default_true() -> bool {
    true
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            create_missing: true,
            attributes: Vec::new(),
            sync_passwords: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainConfig {
    pub name: String,

    #[serde(default)]
    pub connection: ConnectionConfig,

    /// Directory attribute the login username is matched against
    #[serde(default = "default_auth_username")]
    pub auth_username_attribute: String,

    /// Extra LDAP filters ANDed into every user search
    /// Example: "(objectClass=person)"
    #[serde(default)]
    pub auth_scopes: Vec<String>,

    /// Validation rules, evaluated in this order
    #[serde(default)]
    pub auth_rules: Vec<RuleConfig>,

    #[serde(default = "default_true")]
    pub auto_connect: bool,

    #[serde(default)]
    pub on_ambiguous_user: AmbiguousUserPolicy,

    /// Present for synchronized domains
    #[serde(default)]
    pub sync: Option<SyncConfig>,
}

fn default_auth_username() -> String {
    crate::DEFAULT_AUTH_USERNAME_ATTRIBUTE.to_string()
}

impl DomainConfig {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            connection: ConnectionConfig::default(),
            auth_username_attribute: default_auth_username(),
            auth_scopes: Vec::new(),
            auth_rules: Vec::new(),
            auto_connect: true,
            on_ambiguous_user: AmbiguousUserPolicy::default(),
            sync: None,
        }
    }

    pub fn is_synchronized(&self) -> bool {
        self.sync.is_some()
    }

    pub fn validate(&self) -> crate::Result<()> {
        if self.name.trim().is_empty() {
            return Err(crate::Error::InvalidConfig(
                "Domain name is required".into(),
            ));
        }

        if self.auth_username_attribute.trim().is_empty() {
            return Err(crate::Error::InvalidConfig(format!(
                "Domain {} has an empty auth username attribute",
                self.name
            )));
        }

        self.connection.validate()?;

        if let Some(sync) = &self.sync {
            for mapping in &sync.attributes {
                if mapping.local.is_empty() || mapping.directory.is_empty() {
                    return Err(crate::Error::InvalidConfig(format!(
                        "Domain {} has an incomplete attribute mapping",
                        self.name
                    )));
                }
            }
        }

        Ok(())
    }
}
