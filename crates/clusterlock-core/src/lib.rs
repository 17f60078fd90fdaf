//! Clusterlock Core Library
//!
//! Cluster-wide advisory locks over a shared SQLite store:
//! - Session-scoped locks, swept when their owner signs off
//! - Persistent locks that survive sign-off and restarts
//! - Per-asset critical sections within a node
//! - Lock events for observers

pub mod config;
pub mod domain;
pub mod error;
pub mod storage;

pub use error::{Error, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::domain::locking::{
        ClusterLockService, Identity, LockEntry, LockResult, LockableResource, ResourceRef,
    };
    pub use crate::domain::session::{SessionEventBus, SessionLifecycleEvent};
    pub use crate::error::{Error, Result};
    pub use crate::storage::Database;
}
