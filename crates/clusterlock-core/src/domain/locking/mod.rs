//! Cluster-wide advisory locking
//!
//! Locks are rows in a shared store keyed by an asset string. Acquiring never
//! waits: a held lock is reported back together with its holder.
//!
//! # Architecture
//!
//! - **Types**: `Identity`, `LockableResource`, `LockEntry`, `LockResult`
//! - **Repositories**: one `LockRepository` per tier over the shared store
//! - **Syncer**: per-asset critical sections inside one node
//! - **Service**: `ClusterLockService`, the public API, plus the sign-off sweep
//!
//! Session locks are swept when their owner signs off on the node that owns
//! the session. Persistent locks live until released explicitly.
//!
//! # Example
//!
//! ```ignore
//! use clusterlock_core::domain::locking::{ClusterLockService, Identity, ResourceRef};
//!
//! let service = ClusterLockService::from_database(&db, config.locking.clone());
//! let course = ResourceRef::new("CourseModule", 42);
//!
//! let result = service.acquire_lock(&course, &alice, "editor").await?;
//! if result.is_success() {
//!     // edit...
//!     service.release_lock(&result).await?;
//! } else {
//!     println!("Locked by {}", result.entry().owner());
//! }
//! ```

pub mod event;
pub mod persistent;
pub(crate) mod protocol;
pub mod repository;
pub mod repository_trait;
pub mod service;
pub mod syncer;
pub mod types;

pub use event::{LockEvent, LockEventType};
pub use persistent::PersistentLockDelegate;
pub use repository::LockRepository;
pub use repository_trait::LockRepositoryTrait;
pub use service::ClusterLockService;
pub use syncer::Syncer;
pub use types::{
    Identity, LockEntry, LockRecord, LockResult, LockTier, LockableResource, MAX_ASSET_LEN,
    ResourceRef, asset_key_of,
};
