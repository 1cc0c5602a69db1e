//! Authentication events
//!
//! Events are delivered synchronously to listeners registered per
//! [`EventKind`]. A failing listener is logged and skipped.

mod bus;
mod listeners;

pub use bus::{EventBus, EventListener};
pub use listeners::{EventRecorder, LogListener};

pub use keyway_core::types::{Event, EventKind, EventPayload};
