//! chainproject-storage: entity and checkpoint stores for ChainProject.
//!
//! Backends:
//! - [`memory`]: in-memory (dev/testing, no persistence)
//! - [`sqlite`]: SQLite via `sqlx` (embedded, single-file persistence)

pub mod memory;

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use memory::InMemoryStore;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;
