//! Event bus

use keyway_core::config::LoggingConfig;
use keyway_core::types::{Event, EventKind};
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, warn};

use super::listeners::LogListener;

/// Receives published events
pub trait EventListener: Send + Sync {
    fn handle(&self, event: &Event) -> anyhow::Result<()>;
}

impl<F> EventListener for F
where
    F: Fn(&Event) -> anyhow::Result<()> + Send + Sync,
{
    fn handle(&self, event: &Event) -> anyhow::Result<()> {
        self(event)
    }
}

/// Listener table, filled at startup and shared read-only afterwards
#[derive(Default)]
pub struct EventBus {
    listeners: HashMap<EventKind, Vec<Arc<dyn EventListener>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bus with a [`LogListener`] on every event kind
    pub fn with_logging() -> Self {
        let mut bus = Self::new();
        bus.listen_all(LogListener);
        bus
    }

    /// Empty bus, or a logging bus when `logging.events` is set
    pub fn from_config(config: &LoggingConfig) -> Self {
        if config.events {
            Self::with_logging()
        } else {
            Self::new()
        }
    }

    pub fn listen(&mut self, kind: EventKind, listener: impl EventListener + 'static) {
        self.listen_shared(kind, Arc::new(listener));
    }

    pub fn listen_shared(&mut self, kind: EventKind, listener: Arc<dyn EventListener>) {
        self.listeners.entry(kind).or_default().push(listener);
    }

    /// Register one listener for every event kind
    pub fn listen_all(&mut self, listener: impl EventListener + 'static) {
        self.listen_all_shared(Arc::new(listener));
    }

    pub fn listen_all_shared(&mut self, listener: Arc<dyn EventListener>) {
        for kind in EventKind::ALL {
            self.listen_shared(kind, listener.clone());
        }
    }

    pub fn listener_count(&self, kind: EventKind) -> usize {
        self.listeners.get(&kind).map_or(0, Vec::len)
    }

    /// Deliver to every listener for the event's kind, in registration order
    pub fn publish(&self, event: Event) {
        let kind = event.kind();
        let Some(listeners) = self.listeners.get(&kind) else {
            return;
        };

        debug!(
            "Publishing {} for {}@{} to {} listener(s)",
            kind,
            event.username,
            event.domain,
            listeners.len()
        );

        for (index, listener) in listeners.iter().enumerate() {
            match panic::catch_unwind(AssertUnwindSafe(|| listener.handle(&event))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    warn!("Listener {} for {} failed: {:#}", index, kind, e);
                }
                Err(_) => {
                    warn!("Listener {} for {} panicked", index, kind);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keyway_core::types::EventPayload;
    use parking_lot::Mutex;

    fn authenticating() -> Event {
        Event::new("corp", "alice", EventPayload::Authenticating)
    }

    #[test]
    fn test_delivery_in_registration_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut bus = EventBus::new();

        for name in ["first", "second", "third"] {
            let seen = seen.clone();
            bus.listen(EventKind::Authenticating, move |_: &Event| -> anyhow::Result<()> {
                seen.lock().push(name);
                Ok(())
            });
        }

        bus.publish(authenticating());
        assert_eq!(*seen.lock(), vec!["first", "second", "third"]);
    }

    #[test]
    fn test_failing_listeners_do_not_stop_delivery() {
        let delivered = Arc::new(Mutex::new(0));
        let mut bus = EventBus::new();

        bus.listen(EventKind::Authenticating, |_: &Event| -> anyhow::Result<()> {
            Err(anyhow::anyhow!("listener broke"))
        });
        bus.listen(EventKind::Authenticating, |_: &Event| -> anyhow::Result<()> {
            panic!("listener panicked")
        });
        let counter = delivered.clone();
        bus.listen(EventKind::Authenticating, move |_: &Event| -> anyhow::Result<()> {
            *counter.lock() += 1;
            Ok(())
        });

        bus.publish(authenticating());
        assert_eq!(*delivered.lock(), 1);
    }

    #[test]
    fn test_only_matching_kind_is_delivered() {
        let delivered = Arc::new(Mutex::new(0));
        let counter = delivered.clone();
        let mut bus = EventBus::new();
        bus.listen(EventKind::Authenticated, move |_: &Event| -> anyhow::Result<()> {
            *counter.lock() += 1;
            Ok(())
        });

        bus.publish(authenticating());
        assert_eq!(*delivered.lock(), 0);
    }

    #[test]
    fn test_from_config() {
        let mut config = LoggingConfig::default();
        assert_eq!(EventBus::from_config(&config).listener_count(EventKind::Importing), 0);

        config.events = true;
        let bus = EventBus::from_config(&config);
        for kind in EventKind::ALL {
            assert_eq!(bus.listener_count(kind), 1);
        }
    }
}
