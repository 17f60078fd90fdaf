//! Persistent lock tier
//!
//! Same acquire/release rules as session locks, but backed by its own table
//! and never cleared by sign-off sweeps or node restarts. Reached through
//! [`ClusterLockService`](super::service::ClusterLockService), which wraps
//! every call in the per-asset critical section.

use std::sync::Arc;
use tracing::info;

use super::event::LockEvent;
use super::protocol;
use super::repository_trait::LockRepositoryTrait;
use super::types::{Identity, LockEntry, LockResult};
use crate::domain::events::EventPublisher;
use crate::error::Result;

/// Manager for long-lived locks
#[derive(Clone)]
pub struct PersistentLockDelegate {
    repository: Arc<dyn LockRepositoryTrait>,
    publisher: Option<Arc<dyn EventPublisher>>,
}

impl PersistentLockDelegate {
    pub fn new(repository: Arc<dyn LockRepositoryTrait>) -> Self {
        Self {
            repository,
            publisher: None,
        }
    }

    pub(crate) fn set_publisher(&mut self, publisher: Arc<dyn EventPublisher>) {
        self.publisher = Some(publisher);
    }

    pub async fn acquire(&self, asset: &str, requester: &Identity) -> Result<LockResult> {
        protocol::acquire(
            self.repository.as_ref(),
            self.publisher.as_deref(),
            asset,
            requester,
        )
        .await
    }

    pub async fn release(&self, entry: &LockEntry) -> Result<()> {
        protocol::release(self.repository.as_ref(), self.publisher.as_deref(), entry).await
    }

    pub async fn is_locked(&self, asset: &str) -> Result<bool> {
        Ok(self.repository.find_lock(asset).await?.is_some())
    }

    pub async fn list_entries(&self) -> Result<Vec<LockEntry>> {
        let records = self.repository.list_all_locks().await?;
        Ok(records.iter().map(|r| r.to_entry()).collect())
    }

    /// Manual cleanup of every persistent lock held by `owner`
    pub async fn release_all_for(&self, owner: &Identity) -> Result<u64> {
        let removed = self.repository.delete_all_locks_for(owner).await?;
        info!(owner = %owner, removed = removed, "Released persistent locks");
        protocol::publish(
            self.publisher.as_deref(),
            LockEvent::locks_swept(owner, self.repository.tier(), removed),
        )
        .await;
        Ok(removed)
    }
}

impl std::fmt::Debug for PersistentLockDelegate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistentLockDelegate")
            .field("tier", &self.repository.tier())
            .field("publishes_events", &self.publisher.is_some())
            .finish()
    }
}
