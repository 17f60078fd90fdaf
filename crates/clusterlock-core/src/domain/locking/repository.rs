//! Lock repository for database operations
//!
//! One repository instance serves one tier; both tiers share the same row
//! shape and differ only in the table they address.

use async_trait::async_trait;
use chrono::{DateTime, SubsecRound, Utc};
use sqlx::SqlitePool;

use super::repository_trait::LockRepositoryTrait;
use super::types::{Identity, LockRecord, LockTier};
use crate::error::{Error, Result};

/// Repository for lock database operations
#[derive(Debug, Clone)]
pub struct LockRepository {
    pool: SqlitePool,
    tier: LockTier,
}

impl LockRepository {
    /// Create a repository for the given tier
    pub fn new(pool: SqlitePool, tier: LockTier) -> Self {
        Self { pool, tier }
    }

    /// Repository over the session-scoped lock table
    pub fn session(pool: SqlitePool) -> Self {
        Self::new(pool, LockTier::Session)
    }

    /// Repository over the persistent lock table
    pub fn persistent(pool: SqlitePool) -> Self {
        Self::new(pool, LockTier::Persistent)
    }

    /// Get a reference to the underlying connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn find_lock(&self, asset: &str) -> Result<Option<LockRecord>> {
        let sql = format!(
            "SELECT asset, owner_key, owner_name, created_at FROM {} WHERE asset = ?",
            self.tier.table()
        );

        let row: Option<LockRow> = sqlx::query_as(&sql)
            .bind(asset)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::DatabaseError)?;

        Ok(row.map(LockRow::into_record))
    }

    pub fn create_lock(&self, asset: &str, owner: &Identity) -> LockRecord {
        LockRecord {
            asset: asset.to_string(),
            owner: owner.clone(),
            // Stored and projected with millisecond precision
            created_at: Utc::now().trunc_subsecs(3),
        }
    }

    pub async fn save_lock(&self, record: &LockRecord) -> Result<()> {
        let sql = format!(
            "INSERT INTO {} (asset, owner_key, owner_name, created_at) VALUES (?, ?, ?, ?)",
            self.tier.table()
        );

        sqlx::query(&sql)
            .bind(&record.asset)
            .bind(record.owner.key)
            .bind(&record.owner.name)
            .bind(record.created_at)
            .execute(&self.pool)
            .await
            .map_err(Error::DatabaseError)?;

        Ok(())
    }

    pub async fn delete_lock(&self, record: &LockRecord) -> Result<bool> {
        let sql = format!(
            "DELETE FROM {} WHERE asset = ? AND owner_key = ?",
            self.tier.table()
        );

        let result = sqlx::query(&sql)
            .bind(&record.asset)
            .bind(record.owner.key)
            .execute(&self.pool)
            .await
            .map_err(Error::DatabaseError)?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn list_all_locks(&self) -> Result<Vec<LockRecord>> {
        let sql = format!(
            "SELECT asset, owner_key, owner_name, created_at FROM {} ORDER BY created_at, asset",
            self.tier.table()
        );

        let rows: Vec<LockRow> = sqlx::query_as(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(Error::DatabaseError)?;

        Ok(rows.into_iter().map(LockRow::into_record).collect())
    }

    pub async fn delete_all_locks_for(&self, owner: &Identity) -> Result<u64> {
        let sql = format!("DELETE FROM {} WHERE owner_key = ?", self.tier.table());

        // Dropping the transaction on error rolls it back
        let mut tx = self.pool.begin().await.map_err(Error::DatabaseError)?;
        let result = sqlx::query(&sql)
            .bind(owner.key)
            .execute(&mut *tx)
            .await
            .map_err(Error::DatabaseError)?;
        tx.commit().await.map_err(Error::DatabaseError)?;

        Ok(result.rows_affected())
    }

    pub async fn delete_all_locks(&self) -> Result<u64> {
        let sql = format!("DELETE FROM {}", self.tier.table());

        let result = sqlx::query(&sql)
            .execute(&self.pool)
            .await
            .map_err(Error::DatabaseError)?;

        Ok(result.rows_affected())
    }
}

// ========== Trait Implementation ==========

#[async_trait]
impl LockRepositoryTrait for LockRepository {
    fn tier(&self) -> LockTier {
        self.tier
    }

    async fn find_lock(&self, asset: &str) -> Result<Option<LockRecord>> {
        self.find_lock(asset).await
    }

    fn create_lock(&self, asset: &str, owner: &Identity) -> LockRecord {
        self.create_lock(asset, owner)
    }

    async fn save_lock(&self, record: &LockRecord) -> Result<()> {
        self.save_lock(record).await
    }

    async fn delete_lock(&self, record: &LockRecord) -> Result<bool> {
        self.delete_lock(record).await
    }

    async fn list_all_locks(&self) -> Result<Vec<LockRecord>> {
        self.list_all_locks().await
    }

    async fn delete_all_locks_for(&self, owner: &Identity) -> Result<u64> {
        self.delete_all_locks_for(owner).await
    }

    async fn delete_all_locks(&self) -> Result<u64> {
        self.delete_all_locks().await
    }
}

/// Database row for a lock
#[derive(sqlx::FromRow)]
struct LockRow {
    asset: String,
    owner_key: i64,
    owner_name: String,
    created_at: DateTime<Utc>,
}

impl LockRow {
    fn into_record(self) -> LockRecord {
        LockRecord {
            asset: self.asset,
            owner: Identity::new(self.owner_key, self.owner_name),
            created_at: self.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Database;

    async fn create_test_db() -> SqlitePool {
        let db = Database::in_memory()
            .await
            .expect("Failed to create test database");
        db.pool().clone()
    }

    fn alice() -> Identity {
        Identity::new(1, "alice")
    }

    fn bob() -> Identity {
        Identity::new(2, "bob")
    }

    #[tokio::test]
    async fn test_save_and_find_lock() {
        let repo = LockRepository::session(create_test_db().await);

        assert!(repo.find_lock("Course::1").await.unwrap().is_none());

        let record = repo.create_lock("Course::1", &alice());
        repo.save_lock(&record).await.expect("Failed to save");

        let found = repo
            .find_lock("Course::1")
            .await
            .expect("Failed to find")
            .expect("Lock not found");

        assert_eq!(found, record);
        assert_eq!(found.owner.name, "alice");
    }

    #[tokio::test]
    async fn test_create_lock_is_not_persisted() {
        let repo = LockRepository::session(create_test_db().await);

        let _record = repo.create_lock("Course::1", &alice());
        assert!(repo.find_lock("Course::1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_save_duplicate_asset_propagates_unique_violation() {
        let repo = LockRepository::session(create_test_db().await);

        repo.save_lock(&repo.create_lock("Course::1", &alice()))
            .await
            .unwrap();

        let err = repo
            .save_lock(&repo.create_lock("Course::1", &bob()))
            .await
            .expect_err("second insert must fail");

        assert!(err.is_unique_violation());
        assert_eq!(err.code(), "E400");
    }

    #[tokio::test]
    async fn test_delete_lock_requires_matching_owner() {
        let repo = LockRepository::session(create_test_db().await);

        let record = repo.create_lock("Course::1", &alice());
        repo.save_lock(&record).await.unwrap();

        let foreign = LockRecord {
            owner: bob(),
            ..record.clone()
        };
        assert!(!repo.delete_lock(&foreign).await.unwrap());
        assert!(repo.find_lock("Course::1").await.unwrap().is_some());

        assert!(repo.delete_lock(&record).await.unwrap());
        assert!(repo.find_lock("Course::1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_and_delete_all_for_owner() {
        let repo = LockRepository::session(create_test_db().await);

        for asset in ["Course::1", "Course::2", "Course::3"] {
            repo.save_lock(&repo.create_lock(asset, &alice())).await.unwrap();
        }
        repo.save_lock(&repo.create_lock("Course::4", &bob())).await.unwrap();

        assert_eq!(repo.list_all_locks().await.unwrap().len(), 4);

        let deleted = repo.delete_all_locks_for(&alice()).await.unwrap();
        assert_eq!(deleted, 3);

        let remaining = repo.list_all_locks().await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].owner, bob());
    }

    #[tokio::test]
    async fn test_tiers_are_isolated() {
        let pool = create_test_db().await;
        let session = LockRepository::session(pool.clone());
        let persistent = LockRepository::persistent(pool);

        session
            .save_lock(&session.create_lock("Course::1", &alice()))
            .await
            .unwrap();
        persistent
            .save_lock(&persistent.create_lock("Course::1", &bob()))
            .await
            .unwrap();

        assert_eq!(session.delete_all_locks().await.unwrap(), 1);
        let kept = persistent.find_lock("Course::1").await.unwrap().unwrap();
        assert_eq!(kept.owner, bob());
        assert_eq!(LockRepositoryTrait::tier(&persistent), LockTier::Persistent);
    }
}
