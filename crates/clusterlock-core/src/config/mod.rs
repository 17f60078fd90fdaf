//! Configuration management with file persistence

use anyhow::{Context, anyhow};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::PathBuf;

use crate::storage::{DatabaseConfig, default_database_path};

/// Environment variable overriding the config directory
pub const CONFIG_DIR_ENV: &str = "CLUSTERLOCK_CONFIG_DIR";

/// Clusterlock configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseSettings,
    pub locking: LockingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    /// Shared lock store; every node of the cluster must point at the same file
    pub path: PathBuf,
    pub max_connections: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LockingConfig {
    /// Name of this node, used in logs
    pub node_id: String,
    /// Drop every session-scoped lock when the node starts.
    /// Only safe when this is the sole node using the store.
    pub clear_session_locks_on_startup: bool,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            path: default_database_path(),
            max_connections: 5,
        }
    }
}

impl Default for LockingConfig {
    fn default() -> Self {
        Self {
            node_id: gethostname::gethostname().to_string_lossy().into_owned(),
            clear_session_locks_on_startup: false,
        }
    }
}

impl DatabaseSettings {
    /// Connection-level configuration for opening the store
    pub fn to_database_config(&self) -> DatabaseConfig {
        DatabaseConfig::with_path(self.path.clone()).max_connections(self.max_connections)
    }
}

impl Config {
    /// Get the config directory path
    pub fn config_dir() -> anyhow::Result<PathBuf> {
        let dir = if let Ok(custom_dir) = env::var(CONFIG_DIR_ENV) {
            PathBuf::from(custom_dir)
        } else {
            dirs::config_dir()
                .ok_or_else(|| anyhow!("Could not determine config directory"))?
                .join("clusterlock")
        };
        Ok(dir)
    }

    /// Get the config file path
    pub fn config_path() -> anyhow::Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Load configuration from file, or defaults if it doesn't exist
    pub fn load() -> anyhow::Result<Self> {
        let path = Self::config_path()?;

        if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            let config: Config = toml::from_str(&contents)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
            config.validate()?;
            Ok(config)
        } else {
            Ok(Config::default())
        }
    }

    /// Save configuration to file
    pub fn save(&self) -> anyhow::Result<()> {
        self.validate()?;

        let dir = Self::config_dir()?;
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create config directory: {}", dir.display()))?;

        let path = Self::config_path()?;
        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        fs::write(&path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.database.max_connections == 0 {
            return Err(anyhow!("database.max_connections must be at least 1"));
        }
        if self.locking.node_id.trim().is_empty() {
            return Err(anyhow!("locking.node_id must not be empty"));
        }
        Ok(())
    }

    /// Get a configuration value by key
    pub fn get(&self, key: &str) -> anyhow::Result<String> {
        match key {
            "database.path" => Ok(self.database.path.display().to_string()),
            "database.max_connections" => Ok(self.database.max_connections.to_string()),
            "locking.node_id" => Ok(self.locking.node_id.clone()),
            "locking.clear_session_locks_on_startup" => {
                Ok(self.locking.clear_session_locks_on_startup.to_string())
            }
            _ => Err(anyhow!(
                "Unknown configuration key: {}. Use `clusterlock config show` to see available keys.",
                key
            )),
        }
    }

    /// Set a configuration value by key
    pub fn set(&mut self, key: &str, value: &str) -> anyhow::Result<()> {
        match key {
            "database.path" => {
                if value.trim().is_empty() {
                    return Err(anyhow!("database.path must not be empty"));
                }
                self.database.path = PathBuf::from(value);
            }
            "database.max_connections" => {
                let max: u32 = value
                    .parse()
                    .with_context(|| format!("Invalid max_connections value: {}", value))?;
                if max == 0 {
                    return Err(anyhow!("database.max_connections must be at least 1"));
                }
                self.database.max_connections = max;
            }
            "locking.node_id" => {
                if value.trim().is_empty() {
                    return Err(anyhow!("locking.node_id must not be empty"));
                }
                self.locking.node_id = value.to_string();
            }
            "locking.clear_session_locks_on_startup" => {
                self.locking.clear_session_locks_on_startup = value
                    .parse()
                    .with_context(|| format!("Invalid boolean value: {}", value))?;
            }
            _ => {
                return Err(anyhow!(
                    "Unknown configuration key: {}. Use `clusterlock config show` to see available keys.",
                    key
                ));
            }
        }
        Ok(())
    }

    /// List all configuration keys and their values
    pub fn list(&self) -> anyhow::Result<Vec<(String, String)>> {
        let keys = [
            "database.path",
            "database.max_connections",
            "locking.node_id",
            "locking.clear_session_locks_on_startup",
        ];

        keys.into_iter()
            .map(|key| {
                let value = self.get(key)?;
                Ok((key.to_string(), value))
            })
            .collect()
    }
}
