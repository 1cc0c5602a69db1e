//! Core types for Keyway

mod event;
mod identity;
mod outcome;
mod record;

pub use event::*;
pub use identity::*;
pub use outcome::*;
pub use record::*;
