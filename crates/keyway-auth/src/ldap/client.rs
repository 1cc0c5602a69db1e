//! LDAP client implementation
//!
//! Opens connections with the domain's service account and performs user
//! searches and credential binds through `ldap3`.

use async_trait::async_trait;
use keyway_core::config::ConnectionConfig;
use keyway_core::types::DirectoryIdentity;
use ldap3::{Ldap, LdapConnAsync, LdapConnSettings, LdapError, Scope, SearchEntry};
use std::time::Duration;
use tracing::debug;

use crate::directory::{DirectoryConnection, DirectoryConnector, DirectoryError, Filter};

// LDAP result codes that matter for binds
const RC_SUCCESS: u32 = 0;
const RC_INAPPROPRIATE_AUTH: u32 = 48;
const RC_INVALID_CREDENTIALS: u32 = 49;
const RC_BUSY: u32 = 51;
const RC_UNAVAILABLE: u32 = 52;
const RC_UNWILLING_TO_PERFORM: u32 = 53;

/// Connector for LDAP servers
#[derive(Debug, Clone, Default)]
pub struct LdapDirectory;

impl LdapDirectory {
    pub fn new() -> Self {
        Self
    }

    /// Create LDAP connection with proper TLS settings
    async fn create_connection(config: &ConnectionConfig) -> Result<Ldap, DirectoryError> {
        let settings = LdapConnSettings::new()
            .set_conn_timeout(config.timeout())
            .set_starttls(config.start_tls)
            .set_no_tls_verify(config.skip_tls_verify);

        debug!("Connecting to LDAP server: {}", config.server_url);

        let (conn, ldap) = LdapConnAsync::with_settings(settings, &config.server_url)
            .await
            .map_err(|e| DirectoryError::Connect(format!("Failed to connect to LDAP server: {}", e)))?;

        ldap3::drive!(conn);
        Ok(ldap)
    }
}

#[async_trait]
impl DirectoryConnector for LdapDirectory {
    async fn open(
        &self,
        config: &ConnectionConfig,
    ) -> Result<Box<dyn DirectoryConnection>, DirectoryError> {
        let mut ldap = Self::create_connection(config).await?;
        let timeout = config.timeout();

        // Bind with service account
        if !config.bind_dn.is_empty() {
            let result = ldap
                .with_timeout(timeout)
                .simple_bind(&config.bind_dn, &config.bind_password)
                .await
                .map_err(|e| transport_error("service bind", timeout, e))?;

            if result.rc != RC_SUCCESS {
                let _ = ldap.unbind().await;
                return Err(classify_bind_code(result.rc, &result.text));
            }
        }

        Ok(Box::new(LdapSession { ldap, timeout }))
    }
}

struct LdapSession {
    ldap: Ldap,
    timeout: Duration,
}

#[async_trait]
impl DirectoryConnection for LdapSession {
    async fn search(
        &mut self,
        base: &str,
        filter: &Filter,
    ) -> Result<Vec<DirectoryIdentity>, DirectoryError> {
        let filter = filter.to_string();
        debug!("Searching {} with filter: {}", base, filter);

        let (rs, _res) = self
            .ldap
            .with_timeout(self.timeout)
            .search(base, Scope::Subtree, &filter, vec!["*"])
            .await
            .map_err(|e| transport_error("search", self.timeout, e))?
            .success()
            .map_err(|e| DirectoryError::Protocol(format!("User search error: {}", e)))?;

        Ok(rs
            .into_iter()
            .map(|result| {
                let entry = SearchEntry::construct(result);
                DirectoryIdentity::from_attributes(entry.dn, entry.attrs)
            })
            .collect())
    }

    async fn bind(&mut self, dn: &str, credential: &str) -> Result<(), DirectoryError> {
        // An empty password would be an unauthenticated bind, which succeeds
        if credential.is_empty() {
            return Err(DirectoryError::InvalidCredentials);
        }

        let result = self
            .ldap
            .with_timeout(self.timeout)
            .simple_bind(dn, credential)
            .await
            .map_err(|e| transport_error("bind", self.timeout, e))?;

        match result.rc {
            RC_SUCCESS => Ok(()),
            rc => Err(classify_bind_code(rc, &result.text)),
        }
    }

    async fn close(&mut self) -> Result<(), DirectoryError> {
        self.ldap
            .unbind()
            .await
            .map_err(|e| DirectoryError::Connect(format!("Unbind failed: {}", e)))
    }
}

fn transport_error(operation: &'static str, after: Duration, err: LdapError) -> DirectoryError {
    match err {
        LdapError::Timeout { .. } => DirectoryError::Timeout { operation, after },
        other => DirectoryError::Connect(format!("LDAP {} failed: {}", operation, other)),
    }
}

/// Map a non-zero bind result code
fn classify_bind_code(rc: u32, text: &str) -> DirectoryError {
    match rc {
        RC_INVALID_CREDENTIALS | RC_INAPPROPRIATE_AUTH => DirectoryError::InvalidCredentials,
        RC_UNWILLING_TO_PERFORM => DirectoryError::AccountDisabled,
        RC_BUSY | RC_UNAVAILABLE => {
            DirectoryError::Connect(format!("Directory unavailable (code {}): {}", rc, text))
        }
        _ => DirectoryError::Protocol(format!("Bind failed with code {}: {}", rc, text)),
    }
}
