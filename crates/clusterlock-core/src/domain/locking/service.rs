//! Cluster lock service
//!
//! The public locking API. Every acquire and release runs inside the
//! syncer's critical section for its asset, so two tasks of this node never
//! interleave a find/decide/save sequence on the same asset. Exclusion
//! between nodes comes from the store's unique asset key.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use super::event::LockEvent;
use super::persistent::PersistentLockDelegate;
use super::protocol;
use super::repository::LockRepository;
use super::repository_trait::LockRepositoryTrait;
use super::syncer::Syncer;
use super::types::{Identity, LockEntry, LockResult, LockableResource, asset_key_of};
use crate::config::LockingConfig;
use crate::domain::events::EventPublisher;
use crate::domain::session::{
    SessionEventBus, SessionLifecycleEvent, SessionLifecycleHandler, SessionListenerHandle,
};
use crate::error::Result;
use crate::storage::Database;

/// Cluster-wide advisory lock service
pub struct ClusterLockService {
    repository: Arc<dyn LockRepositoryTrait>,
    persistent: PersistentLockDelegate,
    syncer: Arc<Syncer>,
    publisher: Option<Arc<dyn EventPublisher>>,
    settings: LockingConfig,
}

impl ClusterLockService {
    /// Wire a service from its collaborators
    pub fn new(
        repository: Arc<dyn LockRepositoryTrait>,
        persistent: PersistentLockDelegate,
        syncer: Arc<Syncer>,
        settings: LockingConfig,
    ) -> Self {
        Self {
            repository,
            persistent,
            syncer,
            publisher: None,
            settings,
        }
    }

    /// Wire a service over both lock tables of `db` with a fresh syncer
    pub fn from_database(db: &Database, settings: LockingConfig) -> Self {
        let pool = db.pool().clone();
        Self::new(
            Arc::new(LockRepository::session(pool.clone())),
            PersistentLockDelegate::new(Arc::new(LockRepository::persistent(pool))),
            Arc::new(Syncer::new()),
            settings,
        )
    }

    /// Publish lock events through `publisher`
    pub fn with_publisher(mut self, publisher: Arc<dyn EventPublisher>) -> Self {
        self.persistent.set_publisher(publisher.clone());
        self.publisher = Some(publisher);
        self
    }

    pub fn settings(&self) -> &LockingConfig {
        &self.settings
    }

    /// Node start hook
    ///
    /// Clears session-scoped locks when configured to; persistent locks are
    /// always kept.
    pub async fn initialize(&self) -> Result<()> {
        if self.settings.clear_session_locks_on_startup {
            let removed = self.repository.delete_all_locks().await?;
            info!(
                node = %self.settings.node_id,
                removed = removed,
                "Cleared session locks on startup"
            );
        }
        Ok(())
    }

    // ========== Session-scoped locks ==========

    /// Try to lock `resource`/`sub_key` for `requester`
    ///
    /// Never waits on the holder: a held lock yields `success == false` with
    /// the holder's entry. Reacquiring one's own lock succeeds and returns
    /// the original entry unchanged.
    pub async fn acquire_lock(
        &self,
        resource: &impl LockableResource,
        requester: &Identity,
        sub_key: &str,
    ) -> Result<LockResult> {
        let asset = asset_key_of(resource, sub_key)?;
        self.syncer
            .run_exclusive(&asset, || {
                protocol::acquire(
                    self.repository.as_ref(),
                    self.publisher.as_deref(),
                    &asset,
                    requester,
                )
            })
            .await
    }

    /// Release the lock of a successful acquire; failed results are a no-op
    pub async fn release_lock(&self, result: &LockResult) -> Result<()> {
        if !result.is_success() {
            return Ok(());
        }
        self.release_lock_entry(result.entry()).await
    }

    /// Release the lock described by `entry`
    ///
    /// Fails with `LockOwnershipViolation` if the live lock belongs to
    /// someone other than `entry.owner()`. An already released lock is a
    /// no-op.
    pub async fn release_lock_entry(&self, entry: &LockEntry) -> Result<()> {
        self.syncer
            .run_exclusive(entry.asset(), || {
                protocol::release(self.repository.as_ref(), self.publisher.as_deref(), entry)
            })
            .await
    }

    /// Best-effort check; may be stale by the time the caller acts on it
    pub async fn is_locked(&self, resource: &impl LockableResource, sub_key: &str) -> Result<bool> {
        let asset = asset_key_of(resource, sub_key)?;
        Ok(self.repository.find_lock(&asset).await?.is_some())
    }

    /// Every session-scoped lock, for operational visibility
    pub async fn admin_only_get_lock_entries(&self) -> Result<Vec<LockEntry>> {
        let records = self.repository.list_all_locks().await?;
        Ok(records.iter().map(|r| r.to_entry()).collect())
    }

    /// Sweep every session-scoped lock held by `owner`
    ///
    /// A failed delete is rolled back and retried once. Returns the number of
    /// removed locks, or `None` if both attempts failed; the failure is
    /// logged and the locks stay until a later sweep.
    pub async fn release_all_locks_for(&self, owner: &Identity) -> Option<u64> {
        let removed = match self.repository.delete_all_locks_for(owner).await {
            Ok(removed) => removed,
            Err(first) => {
                warn!(
                    owner = %owner,
                    node = %self.settings.node_id,
                    error = %first,
                    "Lock sweep failed, retrying once"
                );
                match self.repository.delete_all_locks_for(owner).await {
                    Ok(removed) => removed,
                    Err(second) => {
                        error!(
                            owner = %owner,
                            node = %self.settings.node_id,
                            error = %second,
                            "Lock sweep failed twice, giving up"
                        );
                        return None;
                    }
                }
            }
        };

        info!(owner = %owner, removed = removed, "Swept session locks");
        protocol::publish(
            self.publisher.as_deref(),
            LockEvent::locks_swept(owner, self.repository.tier(), removed),
        )
        .await;
        Some(removed)
    }

    /// Subscribe the sign-off sweep to `bus`
    ///
    /// The subscription ends when the returned handle is stopped or dropped.
    pub fn start_session_listener(self: &Arc<Self>, bus: &SessionEventBus) -> SessionListenerHandle {
        info!(node = %self.settings.node_id, "Starting lock sweep listener");
        SessionListenerHandle::spawn(bus, self.clone())
    }

    // ========== Persistent locks ==========

    pub async fn acquire_persistent_lock(
        &self,
        resource: &impl LockableResource,
        requester: &Identity,
        sub_key: &str,
    ) -> Result<LockResult> {
        let asset = asset_key_of(resource, sub_key)?;
        self.syncer
            .run_exclusive(&asset, || self.persistent.acquire(&asset, requester))
            .await
    }

    pub async fn release_persistent_lock(&self, result: &LockResult) -> Result<()> {
        if !result.is_success() {
            return Ok(());
        }
        self.release_persistent_lock_entry(result.entry()).await
    }

    pub async fn release_persistent_lock_entry(&self, entry: &LockEntry) -> Result<()> {
        self.syncer
            .run_exclusive(entry.asset(), || self.persistent.release(entry))
            .await
    }

    pub async fn is_persistently_locked(
        &self,
        resource: &impl LockableResource,
        sub_key: &str,
    ) -> Result<bool> {
        let asset = asset_key_of(resource, sub_key)?;
        self.persistent.is_locked(&asset).await
    }

    pub async fn admin_only_get_persistent_lock_entries(&self) -> Result<Vec<LockEntry>> {
        self.persistent.list_entries().await
    }

    pub async fn release_all_persistent_locks_for(&self, owner: &Identity) -> Result<u64> {
        self.persistent.release_all_for(owner).await
    }
}

#[async_trait]
impl SessionLifecycleHandler for ClusterLockService {
    async fn on_session_event(&self, event: &SessionLifecycleEvent) {
        match event {
            SessionLifecycleEvent::SignedOff {
                identity,
                originated_on_this_node: true,
            } => {
                self.release_all_locks_for(identity).await;
            }
            other => {
                debug!(event = %other, "Ignoring session event");
            }
        }
    }
}

impl std::fmt::Debug for ClusterLockService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClusterLockService")
            .field("node_id", &self.settings.node_id)
            .field("persistent", &self.persistent)
            .field("publishes_events", &self.publisher.is_some())
            .finish()
    }
}
