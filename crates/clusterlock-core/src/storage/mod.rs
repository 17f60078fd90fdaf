//! Storage layer - the shared SQLite lock store
//!
//! # Architecture
//!
//! - `database`: Connection pool management and initialization
//! - `migrations`: Schema versioning and automatic migration
//!
//! # Usage
//!
//! ```ignore
//! use clusterlock_core::storage::{Database, DatabaseConfig};
//!
//! // In-memory database for testing
//! let db = Database::in_memory().await?;
//!
//! // Shared file database for a node
//! let db = Database::new(DatabaseConfig::with_path("/srv/shared/locks.db")).await?;
//! ```

pub mod database;
pub mod migrations;

pub use database::{Database, DatabaseConfig, default_database_path};
pub use migrations::{CURRENT_VERSION, MigrationStatus, migration_status, run_migrations};
