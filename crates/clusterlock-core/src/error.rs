//! Error types for Clusterlock

use thiserror::Error;

/// Result type alias using Clusterlock's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Clusterlock error types with helpful messages and suggestions
///
/// Lock conflicts are not errors: they are reported through
/// `LockResult::success == false`.
#[derive(Error, Debug)]
pub enum Error {
    // Lock errors (E300-E399)
    #[error(
        "Lock ownership violation: '{asset}' is held by {holder} but release was requested for {releaser}"
    )]
    LockOwnershipViolation {
        asset: String,
        holder: String,
        releaser: String,
    },

    // Database errors (E400-E499)
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    // Config errors (E600-E699)
    #[error("Configuration error: {0}")]
    ConfigError(String),

    // Input errors (E800-E899)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Parse error: {0}")]
    Parse(String),

    // Generic errors
    #[error("{0}")]
    Other(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Get error code for this error type
    pub fn code(&self) -> &'static str {
        match self {
            Self::LockOwnershipViolation { .. } => "E300",
            Self::DatabaseError(_) => "E400",
            Self::ConfigError(_) => "E600",
            Self::InvalidInput(_) => "E800",
            Self::Parse(_) => "E801",
            Self::Other(_) | Self::Io(_) => "E9999",
        }
    }

    /// Get suggestion for how to fix this error
    pub fn suggestion(&self) -> Option<String> {
        match self {
            Self::LockOwnershipViolation { asset, .. } => Some(format!(
                "The lock on '{}' was taken over by someone else. Inspect it with `clusterlock locks list`.",
                asset
            )),
            Self::DatabaseError(_) => Some("clusterlock db status".to_string()),
            Self::ConfigError(_) => Some("clusterlock config show".to_string()),
            _ => None,
        }
    }

    /// Whether this is a store-level uniqueness violation
    ///
    /// The acquire protocol folds these into the ordinary conflict outcome.
    pub fn is_unique_violation(&self) -> bool {
        match self {
            Self::DatabaseError(sqlx::Error::Database(db_err)) => db_err.is_unique_violation(),
            _ => false,
        }
    }
}
