//! Domain authenticator
//!
//! Runs one authentication attempt against a domain:
//! locate the user, bind with the credential, validate, and synchronize the
//! local record for synchronized domains. Every attempt opens its own
//! directory connection and closes it before touching the record store.

use keyway_core::config::AmbiguousUserPolicy;
use keyway_core::types::{
    AuthOutcome, DirectoryIdentity, Event, EventPayload, LocalRecord, Rejection,
};
use keyway_core::{Error, Result};
use keyway_metadata::LocalRecordStore;
use std::future::Future;
use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::directory::{DirectoryConnection, DirectoryConnector, DirectoryError};
use crate::domain::Domain;
use crate::events::EventBus;
use crate::locator::{DomainUserLocator, LocateError};
use crate::sync::{SyncError, SynchronizationPipeline};
use crate::validation::{ValidationOutcome, ValidationRuleChain};

pub struct DomainAuthenticator {
    connector: Arc<dyn DirectoryConnector>,
    store: Option<Arc<dyn LocalRecordStore>>,
    events: Arc<EventBus>,
    locator: DomainUserLocator,
}

/// State of one attempt, used to label events
struct Attempt<'a> {
    domain: &'a Domain,
    username: &'a str,
    dn: Option<String>,
}

impl DomainAuthenticator {
    pub fn new(connector: Arc<dyn DirectoryConnector>, events: Arc<EventBus>) -> Self {
        Self {
            connector,
            store: None,
            events,
            locator: DomainUserLocator::new(),
        }
    }

    /// Local record store, required for synchronized domains
    pub fn with_store(mut self, store: Arc<dyn LocalRecordStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    pub fn connector(&self) -> &Arc<dyn DirectoryConnector> {
        &self.connector
    }

    pub async fn authenticate(
        &self,
        domain: &Domain,
        username: &str,
        credential: &str,
    ) -> AuthOutcome {
        let cancel = CancellationToken::new();
        self.authenticate_with_cancellation(domain, username, credential, &cancel)
            .await
    }

    /// Authenticate, giving up with `Failed(Cancelled)` once `cancel` fires.
    /// Cancellation is observed while connecting, searching and binding.
    pub async fn authenticate_with_cancellation(
        &self,
        domain: &Domain,
        username: &str,
        credential: &str,
        cancel: &CancellationToken,
    ) -> AuthOutcome {
        let mut attempt = Attempt {
            domain,
            username,
            dn: None,
        };

        self.publish(&attempt, EventPayload::Authenticating);

        match self.run(&mut attempt, credential, cancel).await {
            Ok(outcome) => {
                match &outcome {
                    AuthOutcome::Successful { identity, .. } => {
                        info!(
                            "{} authenticated in domain {} as {}",
                            username,
                            domain.name(),
                            identity.dn
                        );
                    }
                    AuthOutcome::Rejected(rejection) => {
                        warn!(
                            "{} rejected in domain {}: {} ({})",
                            username,
                            domain.name(),
                            rejection,
                            rejection.code()
                        );
                    }
                    AuthOutcome::Failed(_) => {}
                }

                self.publish(
                    &attempt,
                    EventPayload::Authenticated {
                        dn: attempt.dn.clone(),
                        successful: outcome.is_successful(),
                    },
                );
                outcome
            }
            Err(e) => self.fail(&attempt, e),
        }
    }

    /// Look up a user's directory entry without binding as them.
    ///
    /// Returns `None` when no entry matches, or when several match and the
    /// domain rejects ambiguous users.
    pub async fn discover(
        &self,
        domain: &Domain,
        username: &str,
    ) -> Result<Option<DirectoryIdentity>> {
        self.discover_with_cancellation(domain, username, &CancellationToken::new())
            .await
    }

    /// [`discover`](Self::discover) that stops with [`Error::Cancelled`] once
    /// `cancel` fires
    pub async fn discover_with_cancellation(
        &self,
        domain: &Domain,
        username: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<DirectoryIdentity>> {
        let timeout = domain.settings().connection.timeout();

        let connection = &domain.settings().connection;
        let mut conn = self
            .guarded("connect", timeout, cancel, self.connector.open(connection))
            .await?;

        let located = self
            .guarded(
                "search",
                timeout,
                cancel,
                self.locator.locate(domain, username, conn.as_mut()),
            )
            .await;
        self.close(conn.as_mut(), timeout).await;

        match located {
            Ok(identity) => Ok(Some(identity)),
            Err(LocateError::UserNotFound) => Ok(None),
            Err(LocateError::AmbiguousUser { count }) => match domain.settings().on_ambiguous_user {
                AmbiguousUserPolicy::Fail => Err(Error::AmbiguousUser {
                    username: username.to_string(),
                    count,
                }),
                AmbiguousUserPolicy::Reject => Ok(None),
            },
            Err(LocateError::Directory(e)) => Err(e.into()),
        }
    }

    async fn run(
        &self,
        attempt: &mut Attempt<'_>,
        credential: &str,
        cancel: &CancellationToken,
    ) -> Result<AuthOutcome> {
        let domain = attempt.domain;
        let settings = domain.settings();
        let timeout = settings.connection.timeout();

        let store = match (domain.is_synchronized(), &self.store) {
            (true, Some(store)) => Some(store.clone()),
            (true, None) => {
                return Err(Error::InvalidConfig(format!(
                    "Domain {} is synchronized but no local record store is configured",
                    domain.name()
                )))
            }
            (false, _) => None,
        };

        let mut conn = self
            .guarded("connect", timeout, cancel, self.connector.open(&settings.connection))
            .await?;

        let verified = self
            .verify(attempt, conn.as_mut(), credential, timeout, cancel)
            .await;
        self.close(conn.as_mut(), timeout).await;

        let identity = match verified? {
            ControlFlow::Continue(identity) => identity,
            ControlFlow::Break(outcome) => return Ok(outcome),
        };

        let existing = match &store {
            Some(store) => {
                store
                    .find_by_directory_identity(domain.name(), &identity.dn)
                    .await?
            }
            None => None,
        };

        if let Some(record) = existing.as_ref().filter(|r| r.is_trashed()) {
            self.publish(
                attempt,
                EventPayload::AuthenticatedRecordTrashed {
                    record_id: record.id,
                    dn: identity.dn.clone(),
                },
            );
            return Ok(self.reject_identity(attempt, &identity, Rejection::RecordTrashed));
        }

        let validation =
            ValidationRuleChain::new(&settings.auth_rules).evaluate(&identity, existing.as_ref());
        if let ValidationOutcome::Failed { rule, reason } = validation {
            let rejection = Rejection::RuleFailed { rule, reason };
            return Ok(self.reject_identity(attempt, &identity, rejection));
        }

        let record = match store {
            Some(store) => match self
                .synchronize(attempt, store, &identity, existing, credential)
                .await
            {
                Ok(record) => Some(record),
                Err(SyncError::NoDatabaseRecord) => {
                    let rejection = Rejection::NoDatabaseRecord;
                    return Ok(self.reject_identity(attempt, &identity, rejection));
                }
                Err(SyncError::Failed(e)) => return Err(e),
            },
            None => None,
        };

        self.publish(
            attempt,
            EventPayload::AuthenticationSuccessful {
                identity: identity.clone(),
            },
        );

        Ok(AuthOutcome::Successful { identity, record })
    }

    /// Locate the user and bind with the credential
    async fn verify(
        &self,
        attempt: &mut Attempt<'_>,
        conn: &mut dyn DirectoryConnection,
        credential: &str,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<ControlFlow<AuthOutcome, DirectoryIdentity>> {
        let domain = attempt.domain;

        let located = self
            .guarded(
                "search",
                timeout,
                cancel,
                self.locator.locate(domain, attempt.username, conn),
            )
            .await;

        let identity = match located {
            Ok(identity) => identity,
            Err(LocateError::UserNotFound) => {
                let outcome = self.reject_credentials(attempt, Rejection::UserNotFound);
                return Ok(ControlFlow::Break(outcome));
            }
            Err(LocateError::AmbiguousUser { count }) => {
                return match domain.settings().on_ambiguous_user {
                    AmbiguousUserPolicy::Fail => Err(Error::AmbiguousUser {
                        username: attempt.username.to_string(),
                        count,
                    }),
                    AmbiguousUserPolicy::Reject => Ok(ControlFlow::Break(
                        self.reject_credentials(attempt, Rejection::AmbiguousUser { count }),
                    )),
                };
            }
            Err(LocateError::Directory(e)) => return Err(e.into()),
        };

        attempt.dn = Some(identity.dn.clone());
        self.publish(
            attempt,
            EventPayload::DiscoveredWithCredentials {
                identity: identity.clone(),
            },
        );

        // An empty password would be an unauthenticated bind
        if credential.is_empty() {
            return Ok(ControlFlow::Break(
                self.reject_credentials(attempt, Rejection::InvalidCredentials),
            ));
        }

        let bound = self
            .guarded("bind", timeout, cancel, conn.bind(&identity.dn, credential))
            .await;

        match bound {
            Ok(()) => Ok(ControlFlow::Continue(identity)),
            Err(DirectoryError::InvalidCredentials) => Ok(ControlFlow::Break(
                self.reject_credentials(attempt, Rejection::InvalidCredentials),
            )),
            Err(DirectoryError::AccountDisabled) => Ok(ControlFlow::Break(
                self.reject_credentials(attempt, Rejection::AccountDisabled),
            )),
            Err(e) => Err(e.into()),
        }
    }

    async fn synchronize(
        &self,
        attempt: &Attempt<'_>,
        store: Arc<dyn LocalRecordStore>,
        identity: &DirectoryIdentity,
        existing: Option<LocalRecord>,
        credential: &str,
    ) -> std::result::Result<LocalRecord, SyncError> {
        SynchronizationPipeline::new(store, self.events.clone())
            .synchronize(
                attempt.domain,
                attempt.username,
                identity,
                existing,
                Some(credential),
            )
            .await
    }

    /// Run a directory operation under the domain timeout and the cancellation token
    async fn guarded<T, E, F>(
        &self,
        operation: &'static str,
        after: Duration,
        cancel: &CancellationToken,
        fut: F,
    ) -> std::result::Result<T, E>
    where
        F: Future<Output = std::result::Result<T, E>>,
        E: From<DirectoryError>,
    {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(DirectoryError::Cancelled.into()),
            result = tokio::time::timeout(after, fut) => match result {
                Ok(result) => result,
                Err(_) => Err(DirectoryError::Timeout { operation, after }.into()),
            },
        }
    }

    async fn close(&self, conn: &mut dyn DirectoryConnection, after: Duration) {
        match tokio::time::timeout(after, conn.close()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => debug!("Closing directory connection failed: {}", e),
            Err(_) => debug!("Closing directory connection timed out"),
        }
    }

    /// The user could not be authenticated against the directory
    fn reject_credentials(&self, attempt: &Attempt<'_>, rejection: Rejection) -> AuthOutcome {
        self.publish(
            attempt,
            EventPayload::AuthenticationFailed {
                dn: attempt.dn.clone(),
                code: rejection.code(),
                reason: rejection.to_string(),
            },
        );
        AuthOutcome::Rejected(rejection)
    }

    /// The directory accepted the credential but the identity was refused
    fn reject_identity(
        &self,
        attempt: &Attempt<'_>,
        identity: &DirectoryIdentity,
        rejection: Rejection,
    ) -> AuthOutcome {
        self.publish(
            attempt,
            EventPayload::AuthenticationRejected {
                dn: identity.dn.clone(),
                code: rejection.code(),
                reason: rejection.to_string(),
            },
        );
        AuthOutcome::Rejected(rejection)
    }

    fn fail(&self, attempt: &Attempt<'_>, err: Error) -> AuthOutcome {
        error!(
            "Authentication of {} in domain {} failed: {} ({})",
            attempt.username,
            attempt.domain.name(),
            err,
            err.code()
        );

        self.publish(
            attempt,
            EventPayload::AuthenticationFailed {
                dn: attempt.dn.clone(),
                code: err.code(),
                reason: err.to_string(),
            },
        );
        AuthOutcome::Failed(err)
    }

    fn publish(&self, attempt: &Attempt<'_>, payload: EventPayload) {
        self.events
            .publish(Event::new(attempt.domain.name(), attempt.username, payload));
    }
}
