//! Keyway Core Library
//!
//! Core types, configuration and error handling shared by the Keyway
//! directory authentication crates.

pub mod config;
pub mod error;
pub mod logging;
pub mod types;

pub use config::KeywayConfig;
pub use error::{Error, ErrorKind, Result};

/// Keyway version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Directory attribute matched against the login username by default
pub const DEFAULT_AUTH_USERNAME_ATTRIBUTE: &str = "userprincipalname";

/// Default bound on directory operations, in seconds
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;
