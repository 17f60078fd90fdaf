//! Database migrations
//!
//! Versioned SQLite schema for the lock tables. Migrations are applied
//! automatically on database connection.

use sqlx::{SqliteConnection, SqlitePool};

/// Current schema version
pub const CURRENT_VERSION: i32 = 1;

/// SQL for creating the migrations tracking table
const CREATE_MIGRATIONS_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS _migrations (
        version INTEGER PRIMARY KEY NOT NULL,
        applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
    );
"#;

/// Migration 1: lock tables
///
/// `asset` is the primary key in both tables: at most one row per asset.
const MIGRATION_V1: &str = r#"
    -- Session-scoped locks (swept on sign-off)
    CREATE TABLE IF NOT EXISTS session_locks (
        asset TEXT PRIMARY KEY NOT NULL,
        owner_key INTEGER NOT NULL,
        owner_name TEXT NOT NULL,
        created_at TIMESTAMP NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_session_locks_owner_key ON session_locks(owner_key);

    -- Persistent locks (survive sign-off and restarts)
    CREATE TABLE IF NOT EXISTS persistent_locks (
        asset TEXT PRIMARY KEY NOT NULL,
        owner_key INTEGER NOT NULL,
        owner_name TEXT NOT NULL,
        created_at TIMESTAMP NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_persistent_locks_owner_key ON persistent_locks(owner_key);
"#;

/// Get the current schema version from the database
async fn get_current_version(pool: &SqlitePool) -> anyhow::Result<i32> {
    let mut conn = pool.acquire().await?;
    sqlx::raw_sql(CREATE_MIGRATIONS_TABLE)
        .execute(&mut *conn)
        .await?;
    read_version(&mut conn).await
}

async fn read_version(conn: &mut SqliteConnection) -> anyhow::Result<i32> {
    let row: Option<(Option<i32>,)> = sqlx::query_as("SELECT MAX(version) FROM _migrations")
        .fetch_optional(&mut *conn)
        .await?;

    Ok(row.and_then(|(v,)| v).unwrap_or(0))
}

/// Record that a migration has been applied
async fn record_migration(conn: &mut SqliteConnection, version: i32) -> anyhow::Result<()> {
    sqlx::query("INSERT OR IGNORE INTO _migrations (version) VALUES (?)")
        .bind(version)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Run all pending migrations
///
/// Safe to call from several nodes opening the same store at once: the
/// version check and the schema changes run under one write lock.
pub async fn run_migrations(pool: &SqlitePool) -> anyhow::Result<()> {
    let mut conn = pool.acquire().await?;
    sqlx::raw_sql(CREATE_MIGRATIONS_TABLE)
        .execute(&mut *conn)
        .await?;

    // IMMEDIATE takes the write lock up front; a deferred transaction would
    // let two nodes read version 0 before either writes
    sqlx::raw_sql("BEGIN IMMEDIATE").execute(&mut *conn).await?;
    match apply_pending(&mut conn).await {
        Ok(()) => {
            sqlx::raw_sql("COMMIT").execute(&mut *conn).await?;
            tracing::info!("Database migrations completed");
            Ok(())
        }
        Err(e) => {
            if let Err(rollback) = sqlx::raw_sql("ROLLBACK").execute(&mut *conn).await {
                tracing::warn!(error = %rollback, "Failed to roll back migration");
            }
            Err(e)
        }
    }
}

async fn apply_pending(conn: &mut SqliteConnection) -> anyhow::Result<()> {
    let current_version = read_version(conn).await?;

    tracing::info!(
        current_version = current_version,
        target_version = CURRENT_VERSION,
        "Checking database migrations"
    );

    if current_version >= CURRENT_VERSION {
        tracing::debug!("Database is up to date");
        return Ok(());
    }

    if current_version < 1 {
        tracing::info!("Applying migration v1: Lock tables");
        sqlx::raw_sql(MIGRATION_V1).execute(&mut *conn).await?;
        record_migration(conn, 1).await?;
    }

    Ok(())
}

/// Check if the database needs migrations
pub async fn needs_migration(pool: &SqlitePool) -> anyhow::Result<bool> {
    let current_version = get_current_version(pool).await?;
    Ok(current_version < CURRENT_VERSION)
}

/// Get migration status information
pub async fn migration_status(pool: &SqlitePool) -> anyhow::Result<MigrationStatus> {
    let current_version = get_current_version(pool).await?;
    Ok(MigrationStatus {
        current_version,
        target_version: CURRENT_VERSION,
        needs_migration: current_version < CURRENT_VERSION,
    })
}

/// Migration status information
#[derive(Debug, Clone)]
pub struct MigrationStatus {
    /// Current schema version in the database
    pub current_version: i32,
    /// Target schema version (latest)
    pub target_version: i32,
    /// Whether migrations need to be run
    pub needs_migration: bool,
}
