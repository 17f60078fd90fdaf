//! Repository trait for lock persistence
//!
//! This module defines the trait for lock record storage operations.
//! The trait abstracts over different storage backends (SQLite, etc.).
//! Nothing outside a repository reads or writes the lock tables.

use async_trait::async_trait;

use crate::error::Result;

use super::types::{Identity, LockRecord, LockTier};

/// Repository trait for lock records of one tier
#[async_trait]
pub trait LockRepositoryTrait: Send + Sync {
    /// The tier (table) this repository manages
    fn tier(&self) -> LockTier;

    /// Find the lock for an exact asset key
    async fn find_lock(&self, asset: &str) -> Result<Option<LockRecord>>;

    /// Build a new, not yet persisted record owned by `owner`
    fn create_lock(&self, asset: &str, owner: &Identity) -> LockRecord;

    /// Insert a record
    ///
    /// A row for the same asset makes this fail with a unique violation;
    /// the error is propagated, never swallowed.
    async fn save_lock(&self, record: &LockRecord) -> Result<()>;

    /// Delete a record; returns whether a row was removed
    async fn delete_lock(&self, record: &LockRecord) -> Result<bool>;

    /// Every lock of this tier (admin only)
    async fn list_all_locks(&self) -> Result<Vec<LockRecord>>;

    /// Delete every lock held by `owner` in one transaction
    async fn delete_all_locks_for(&self, owner: &Identity) -> Result<u64>;

    /// Delete every lock of this tier
    async fn delete_all_locks(&self) -> Result<u64>;
}
