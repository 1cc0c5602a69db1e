//! Cryptography utilities for Keyway

pub mod hash;

pub use hash::*;
