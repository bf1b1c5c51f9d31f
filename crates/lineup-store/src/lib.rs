//! lineup-store — SQLite-backed descriptor persistence.
//!
//! Implements the `DescriptorStore` boundary over a single SQLite table
//! with soft-delete lifecycle. Descriptor vectors are sealed at rest
//! with AES-256-GCM; a row that fails to open is skipped, never fatal.

pub mod seal;
pub mod sqlite;

pub use seal::{SealError, SealKey};
pub use sqlite::SqliteDescriptorStore;
