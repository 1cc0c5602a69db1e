//! In-memory directory

use async_trait::async_trait;
use keyway_core::config::ConnectionConfig;
use keyway_core::types::DirectoryIdentity;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use super::{DirectoryConnection, DirectoryConnector, DirectoryError, Filter};

/// Directory served from memory, for tests and local development.
///
/// Entries, passwords and injected failures are shared by every connection
/// the directory opens.
#[derive(Clone, Default)]
pub struct StaticDirectory {
    state: Arc<Mutex<DirectoryState>>,
}

#[derive(Default)]
struct DirectoryState {
    entries: Vec<DirectoryIdentity>,
    passwords: HashMap<String, String>,
    disabled: HashSet<String>,
    open_error: Option<DirectoryError>,
    search_error: Option<DirectoryError>,
    bind_error: Option<DirectoryError>,
    delay: Option<Duration>,
    stats: DirectoryStats,
}

/// Operation counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DirectoryStats {
    pub opens: usize,
    pub searches: usize,
    pub binds: usize,
    pub closes: usize,
}

fn dn_key(dn: &str) -> String {
    dn.trim().to_lowercase()
}

impl StaticDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user(self, identity: DirectoryIdentity, password: &str) -> Self {
        self.add_user(identity, password);
        self
    }

    pub fn add_user(&self, identity: DirectoryIdentity, password: &str) {
        let mut state = self.state.lock();
        state
            .passwords
            .insert(dn_key(&identity.dn), password.to_string());
        state.entries.push(identity);
    }

    /// Binds as this entry fail with [`DirectoryError::AccountDisabled`]
    pub fn disable(&self, dn: &str) {
        self.state.lock().disabled.insert(dn_key(dn));
    }

    pub fn fail_open(&self, error: DirectoryError) {
        self.state.lock().open_error = Some(error);
    }

    pub fn fail_search(&self, error: DirectoryError) {
        self.state.lock().search_error = Some(error);
    }

    pub fn fail_bind(&self, error: DirectoryError) {
        self.state.lock().bind_error = Some(error);
    }

    /// Stall every search and bind
    pub fn delay_operations(&self, delay: Duration) {
        self.state.lock().delay = Some(delay);
    }

    pub fn stats(&self) -> DirectoryStats {
        self.state.lock().stats
    }
}

#[async_trait]
impl DirectoryConnector for StaticDirectory {
    async fn open(
        &self,
        _config: &ConnectionConfig,
    ) -> Result<Box<dyn DirectoryConnection>, DirectoryError> {
        let mut state = self.state.lock();
        state.stats.opens += 1;

        if let Some(error) = state.open_error.clone() {
            return Err(error);
        }

        Ok(Box::new(StaticConnection {
            state: self.state.clone(),
        }))
    }
}

struct StaticConnection {
    state: Arc<Mutex<DirectoryState>>,
}

impl StaticConnection {
    async fn stall(&self) {
        let delay = self.state.lock().delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl DirectoryConnection for StaticConnection {
    async fn search(
        &mut self,
        base: &str,
        filter: &Filter,
    ) -> Result<Vec<DirectoryIdentity>, DirectoryError> {
        self.stall().await;

        let mut state = self.state.lock();
        state.stats.searches += 1;

        if let Some(error) = state.search_error.clone() {
            return Err(error);
        }

        let base = dn_key(base);
        Ok(state
            .entries
            .iter()
            .filter(|entry| base.is_empty() || dn_key(&entry.dn).ends_with(&base))
            .filter(|entry| filter.matches(entry))
            .cloned()
            .collect())
    }

    async fn bind(&mut self, dn: &str, credential: &str) -> Result<(), DirectoryError> {
        self.stall().await;

        let mut state = self.state.lock();
        state.stats.binds += 1;

        if let Some(error) = state.bind_error.clone() {
            return Err(error);
        }

        let key = dn_key(dn);
        if credential.is_empty() || state.passwords.get(&key).map(String::as_str) != Some(credential)
        {
            return Err(DirectoryError::InvalidCredentials);
        }

        if state.disabled.contains(&key) {
            return Err(DirectoryError::AccountDisabled);
        }

        Ok(())
    }

    async fn close(&mut self) -> Result<(), DirectoryError> {
        self.state.lock().stats.closes += 1;
        Ok(())
    }
}
