//! Local identity record storage for Keyway
//!
//! The authentication pipeline only talks to [`LocalRecordStore`]. Two
//! implementations are provided: an in-memory map and a SQLite table.

pub mod memory;
pub mod repository;
pub mod traits;

pub use memory::MemoryRecordStore;
pub use repository::SqliteRecordStore;
pub use traits::*;
