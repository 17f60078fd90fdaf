//! Clusterlock CLI - inspect and administer cluster locks

use anyhow::bail;
use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use clusterlock_core::config::Config;
use clusterlock_core::domain::locking::{ClusterLockService, Identity, LockEntry, ResourceRef};
use clusterlock_core::storage::{Database, DatabaseConfig};
use std::path::PathBuf;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "clusterlock")]
#[command(author, version, about = "Cluster-wide advisory locks", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Lock store to use instead of the configured one
    #[arg(long, global = true)]
    database: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Inspect and manage locks
    Locks {
        #[command(subcommand)]
        action: LocksAction,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Lock store maintenance
    Db {
        #[command(subcommand)]
        action: DbAction,
    },
}

#[derive(Args)]
struct OwnerArgs {
    /// Identity key of the lock owner
    #[arg(long)]
    owner_key: i64,
    /// Login name of the lock owner
    #[arg(long)]
    owner_name: String,
}

impl OwnerArgs {
    fn identity(&self) -> Identity {
        Identity::new(self.owner_key, self.owner_name.clone())
    }
}

#[derive(Subcommand)]
enum LocksAction {
    /// List current locks
    List {
        /// List persistent locks instead of session locks
        #[arg(long)]
        persistent: bool,
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// Acquire a lock
    Acquire {
        /// Resource type name
        #[arg(long = "type")]
        resource_type: String,
        /// Resource id
        #[arg(long)]
        id: i64,
        /// Optional sub-key within the resource
        #[arg(long, default_value = "")]
        sub_key: String,
        #[command(flatten)]
        owner: OwnerArgs,
        #[arg(long)]
        persistent: bool,
    },
    /// Release a lock held by the given owner
    Release {
        /// Asset key, as shown by `locks list`
        #[arg(long)]
        asset: String,
        #[command(flatten)]
        owner: OwnerArgs,
        #[arg(long)]
        persistent: bool,
    },
    /// Release every lock held by an owner
    Sweep {
        #[command(flatten)]
        owner: OwnerArgs,
        /// Sweep persistent locks instead of session locks
        #[arg(long)]
        persistent: bool,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show all configuration values
    Show,
    /// Get a configuration value
    Get { key: String },
    /// Set a configuration value
    Set { key: String, value: String },
}

#[derive(Subcommand)]
enum DbAction {
    /// Show schema version, health and lock counts
    Status,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    // Logs go to stderr so JSON output stays parseable
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(cli).await {
        report(&e);
        std::process::exit(1);
    }
    Ok(())
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Locks { action } => {
            let (db, service) = open_service(cli.database).await?;
            let result = cmd_locks(&service, action).await;
            db.close().await;
            result
        }
        Commands::Config { action } => cmd_config(action),
        Commands::Db { action } => cmd_db(cli.database, action).await,
    }
}

fn report(error: &anyhow::Error) {
    match error.downcast_ref::<clusterlock_core::Error>() {
        Some(err) => {
            eprintln!("Error [{}]: {}", err.code(), err);
            if let Some(hint) = err.suggestion() {
                eprintln!("Hint: {}", hint);
            }
        }
        None => eprintln!("Error: {:#}", error),
    }
}

async fn open_database(database: Option<PathBuf>) -> anyhow::Result<(Config, Database)> {
    let config = Config::load()?;
    let db_config = match database {
        Some(path) => {
            DatabaseConfig::with_path(path).max_connections(config.database.max_connections)
        }
        None => config.database.to_database_config(),
    };
    debug!(path = %db_config.path.display(), "Opening lock store");
    let db = Database::new(db_config).await?;
    Ok((config, db))
}

async fn open_service(database: Option<PathBuf>) -> anyhow::Result<(Database, ClusterLockService)> {
    let (config, db) = open_database(database).await?;
    let service = ClusterLockService::from_database(&db, config.locking);
    Ok((db, service))
}

fn format_millis(millis: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(millis)
        .map(|t| t.format("%Y-%m-%d %H:%M:%S%.3f UTC").to_string())
        .unwrap_or_else(|| millis.to_string())
}

// ============================================================================
// Command Implementations
// ============================================================================

async fn cmd_locks(service: &ClusterLockService, action: LocksAction) -> anyhow::Result<()> {
    match action {
        LocksAction::List { persistent, json } => {
            let (tier, entries) = if persistent {
                ("persistent", service.admin_only_get_persistent_lock_entries().await?)
            } else {
                ("session", service.admin_only_get_lock_entries().await?)
            };

            if json {
                println!("{}", serde_json::to_string_pretty(&entries)?);
            } else if entries.is_empty() {
                println!("No {} locks.", tier);
            } else {
                println!("{} {} lock(s):", entries.len(), tier);
                for entry in &entries {
                    println!(
                        "  {}  held by {}  since {}",
                        entry.asset(),
                        entry.owner(),
                        format_millis(entry.created_at_millis())
                    );
                }
            }
        }
        LocksAction::Acquire {
            resource_type,
            id,
            sub_key,
            owner,
            persistent,
        } => {
            let resource = ResourceRef::new(resource_type, id);
            let requester = owner.identity();
            let result = if persistent {
                service
                    .acquire_persistent_lock(&resource, &requester, &sub_key)
                    .await?
            } else {
                service.acquire_lock(&resource, &requester, &sub_key).await?
            };

            let entry = result.entry();
            if !result.is_success() {
                bail!(
                    "'{}' is locked by {} since {}",
                    entry.asset(),
                    entry.owner(),
                    format_millis(entry.created_at_millis())
                );
            }
            info!(asset = %entry.asset(), owner = %requester, "Acquired lock from CLI");
            println!("Acquired lock on {}", entry.asset());
        }
        LocksAction::Release {
            asset,
            owner,
            persistent,
        } => {
            // Release only compares owners, so the timestamp is irrelevant
            let entry = LockEntry::new(asset, 0, owner.identity());
            if persistent {
                service.release_persistent_lock_entry(&entry).await?;
            } else {
                service.release_lock_entry(&entry).await?;
            }
            println!("Released lock on {}", entry.asset());
        }
        LocksAction::Sweep { owner, persistent } => {
            let identity = owner.identity();
            if persistent {
                let removed = service.release_all_persistent_locks_for(&identity).await?;
                println!("Released {} persistent lock(s) held by {}", removed, identity);
            } else {
                match service.release_all_locks_for(&identity).await {
                    Some(removed) => {
                        println!("Released {} session lock(s) held by {}", removed, identity)
                    }
                    None => bail!("Sweep for {} failed; its locks are still held", identity),
                }
            }
        }
    }
    Ok(())
}

fn cmd_config(action: ConfigAction) -> anyhow::Result<()> {
    match action {
        ConfigAction::Show => {
            let config = Config::load()?;
            println!("# {}", Config::config_path()?.display());
            for (key, value) in config.list()? {
                println!("{} = {}", key, value);
            }
        }
        ConfigAction::Get { key } => {
            let config = Config::load()?;
            println!("{}", config.get(&key)?);
        }
        ConfigAction::Set { key, value } => {
            let mut config = Config::load()?;
            config.set(&key, &value)?;
            config.save()?;
            println!("Set {} = {}", key, value);
        }
    }
    Ok(())
}

async fn cmd_db(database: Option<PathBuf>, action: DbAction) -> anyhow::Result<()> {
    match action {
        DbAction::Status => {
            let (config, db) = open_database(database).await?;
            db.health_check().await?;
            let status = db.migration_status().await?;
            let service = ClusterLockService::from_database(&db, config.locking);
            let session = service.admin_only_get_lock_entries().await?.len();
            let persistent = service.admin_only_get_persistent_lock_entries().await?.len();

            println!("Lock store: {}", db.path().display());
            println!(
                "Schema version: {}/{}",
                status.current_version, status.target_version
            );
            println!("Health: OK");
            println!("Session locks: {}", session);
            println!("Persistent locks: {}", persistent);
            db.close().await;
        }
    }
    Ok(())
}
