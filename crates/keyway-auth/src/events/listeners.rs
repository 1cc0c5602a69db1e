//! Built-in listeners

use keyway_core::types::{Event, EventKind, EventPayload};
use parking_lot::Mutex;
use tracing::{info, warn};

use super::bus::EventListener;

/// Writes each event to the log
#[derive(Debug, Clone, Copy, Default)]
pub struct LogListener;

impl EventListener for LogListener {
    fn handle(&self, event: &Event) -> anyhow::Result<()> {
        let domain = event.domain.as_str();
        let username = event.username.as_str();

        match &event.payload {
            EventPayload::Authenticating => {
                info!(domain, username, "User is authenticating");
            }
            EventPayload::Authenticated { dn, successful } => {
                info!(domain, username, dn = ?dn, successful, "User has authenticated");
            }
            EventPayload::AuthenticationFailed { dn, code, reason } => {
                warn!(domain, username, dn = ?dn, code, reason = %reason, "Authentication failed");
            }
            EventPayload::AuthenticationRejected { dn, code, reason } => {
                warn!(domain, username, dn = %dn, code, reason = %reason, "Authentication rejected");
            }
            EventPayload::AuthenticationSuccessful { identity } => {
                info!(domain, username, dn = %identity.dn, "Authentication successful");
            }
            EventPayload::DiscoveredWithCredentials { identity } => {
                info!(domain, username, dn = %identity.dn, "Located directory entry");
            }
            EventPayload::Importing { dn } => {
                info!(domain, username, dn = %dn, "Importing user");
            }
            EventPayload::Synchronizing { record_id, dn } => {
                info!(domain, username, dn = %dn, record_id = %record_id, "Synchronizing user");
            }
            EventPayload::Synchronized { record, created } => {
                info!(
                    domain,
                    username,
                    dn = %record.directory_dn,
                    record_id = %record.id,
                    created,
                    "User synchronized"
                );
            }
            EventPayload::AuthenticatedRecordTrashed { record_id, dn } => {
                warn!(domain, username, dn = %dn, record_id = %record_id, "Local record is trashed");
            }
        }

        Ok(())
    }
}

/// Keeps every event it receives, in order
#[derive(Debug, Default)]
pub struct EventRecorder {
    events: Mutex<Vec<Event>>,
}

impl EventRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }

    pub fn kinds(&self) -> Vec<EventKind> {
        self.events.lock().iter().map(Event::kind).collect()
    }

    pub fn count(&self, kind: EventKind) -> usize {
        self.events.lock().iter().filter(|e| e.kind() == kind).count()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl EventListener for EventRecorder {
    fn handle(&self, event: &Event) -> anyhow::Result<()> {
        self.events.lock().push(event.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventBus;
    use std::sync::Arc;

    #[test]
    fn test_recorder_keeps_order() {
        let recorder = Arc::new(EventRecorder::new());
        let mut bus = EventBus::new();
        bus.listen_shared(EventKind::Authenticating, recorder.clone());
        bus.listen_shared(EventKind::Importing, recorder.clone());

        bus.publish(Event::new("corp", "bob", EventPayload::Authenticating));
        bus.publish(Event::new(
            "corp",
            "bob",
            EventPayload::Importing {
                dn: "cn=bob,dc=corp".into(),
            },
        ));

        assert_eq!(
            recorder.kinds(),
            vec![EventKind::Authenticating, EventKind::Importing]
        );
        assert_eq!(recorder.count(EventKind::Importing), 1);
    }

    #[test]
    fn test_log_listener_accepts_every_event() {
        let event = Event::new(
            "corp",
            "bob",
            EventPayload::AuthenticationFailed {
                dn: None,
                code: "UserNotFound",
                reason: "no entry".into(),
            },
        );
        assert!(LogListener.handle(&event).is_ok());
    }
}
