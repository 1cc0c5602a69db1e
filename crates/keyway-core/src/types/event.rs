//! Authentication lifecycle events

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{DirectoryIdentity, LocalRecord};

/// Event type, used to register listeners
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Authenticating,
    Authenticated,
    AuthenticationFailed,
    AuthenticationRejected,
    AuthenticationSuccessful,
    DiscoveredWithCredentials,
    Importing,
    Synchronizing,
    Synchronized,
    AuthenticatedRecordTrashed,
}

impl EventKind {
    pub const ALL: [EventKind; 10] = [
        EventKind::Authenticating,
        EventKind::Authenticated,
        EventKind::AuthenticationFailed,
        EventKind::AuthenticationRejected,
        EventKind::AuthenticationSuccessful,
        EventKind::DiscoveredWithCredentials,
        EventKind::Importing,
        EventKind::Synchronizing,
        EventKind::Synchronized,
        EventKind::AuthenticatedRecordTrashed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Authenticating => "authenticating",
            EventKind::Authenticated => "authenticated",
            EventKind::AuthenticationFailed => "authentication_failed",
            EventKind::AuthenticationRejected => "authentication_rejected",
            EventKind::AuthenticationSuccessful => "authentication_successful",
            EventKind::DiscoveredWithCredentials => "discovered_with_credentials",
            EventKind::Importing => "importing",
            EventKind::Synchronizing => "synchronizing",
            EventKind::Synchronized => "synchronized",
            EventKind::AuthenticatedRecordTrashed => "authenticated_record_trashed",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Data attached to an event
#[derive(Debug, Clone)]
pub enum EventPayload {
    /// An attempt started
    Authenticating,
    /// The attempt reached a terminal state other than a hard failure
    Authenticated {
        dn: Option<String>,
        successful: bool,
    },
    /// Locating or binding the user failed, or the attempt failed outright
    AuthenticationFailed {
        dn: Option<String>,
        code: &'static str,
        reason: String,
    },
    /// Directory authentication passed but the identity was refused
    AuthenticationRejected {
        dn: String,
        code: &'static str,
        reason: String,
    },
    AuthenticationSuccessful {
        identity: DirectoryIdentity,
    },
    /// The username resolved to exactly one directory entry
    DiscoveredWithCredentials {
        identity: DirectoryIdentity,
    },
    /// A new local record is about to be created
    Importing {
        dn: String,
    },
    /// An existing local record is about to be updated
    Synchronizing {
        record_id: Uuid,
        dn: String,
    },
    Synchronized {
        record: LocalRecord,
        created: bool,
    },
    /// The linked local record is soft-deleted
    AuthenticatedRecordTrashed {
        record_id: Uuid,
        dn: String,
    },
}

/// Immutable notification of a lifecycle transition
#[derive(Debug, Clone)]
pub struct Event {
    pub domain: String,
    pub username: String,
    pub occurred_at: DateTime<Utc>,
    pub payload: EventPayload,
}

impl Event {
    pub fn new(domain: &str, username: &str, payload: EventPayload) -> Self {
        Self {
            domain: domain.to_string(),
            username: username.to_string(),
            occurred_at: Utc::now(),
            payload,
        }
    }

    pub fn kind(&self) -> EventKind {
        match &self.payload {
            EventPayload::Authenticating => EventKind::Authenticating,
            EventPayload::Authenticated { .. } => EventKind::Authenticated,
            EventPayload::AuthenticationFailed { .. } => EventKind::AuthenticationFailed,
            EventPayload::AuthenticationRejected { .. } => EventKind::AuthenticationRejected,
            EventPayload::AuthenticationSuccessful { .. } => EventKind::AuthenticationSuccessful,
            EventPayload::DiscoveredWithCredentials { .. } => EventKind::DiscoveredWithCredentials,
            EventPayload::Importing { .. } => EventKind::Importing,
            EventPayload::Synchronizing { .. } => EventKind::Synchronizing,
            EventPayload::Synchronized { .. } => EventKind::Synchronized,
            EventPayload::AuthenticatedRecordTrashed { .. } => {
                EventKind::AuthenticatedRecordTrashed
            }
        }
    }

    /// Distinguished name the event concerns, if known
    pub fn dn(&self) -> Option<&str> {
        match &self.payload {
            EventPayload::Authenticating => None,
            EventPayload::Authenticated { dn, .. } | EventPayload::AuthenticationFailed { dn, .. } => {
                dn.as_deref()
            }
            EventPayload::AuthenticationRejected { dn, .. }
            | EventPayload::Importing { dn }
            | EventPayload::Synchronizing { dn, .. }
            | EventPayload::AuthenticatedRecordTrashed { dn, .. } => Some(dn.as_str()),
            EventPayload::AuthenticationSuccessful { identity }
            | EventPayload::DiscoveredWithCredentials { identity } => Some(identity.dn.as_str()),
            EventPayload::Synchronized { record, .. } => Some(record.directory_dn.as_str()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_follows_payload() {
        let event = Event::new(
            "corp",
            "alice",
            EventPayload::Importing {
                dn: "cn=alice,dc=corp".to_string(),
            },
        );

        assert_eq!(event.kind(), EventKind::Importing);
        assert_eq!(event.dn(), Some("cn=alice,dc=corp"));
        assert_eq!(event.kind().to_string(), "importing");
    }

    #[test]
    fn test_all_kinds_are_distinct() {
        let names: std::collections::HashSet<_> =
            EventKind::ALL.iter().map(|k| k.as_str()).collect();
        assert_eq!(names.len(), EventKind::ALL.len());
    }
}
