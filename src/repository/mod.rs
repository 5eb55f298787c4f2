//! Repository layer for database persistence.
//!
//! All SQL access goes through Diesel with compile-time query checking.
//! The sync command only sees the [`PersistenceGateway`] trait.

pub mod gateway;
pub mod memory;
pub mod migrations;
pub mod models;
pub mod pool;
pub mod sqlite;
pub mod util;

pub use gateway::{Checkpoint, CommitCounts, PersistenceGateway};
pub use memory::MemoryGateway;
pub use migrations::run_migrations;
pub use pool::{AsyncSqlitePool, DieselError};
pub use sqlite::SqliteGateway;
