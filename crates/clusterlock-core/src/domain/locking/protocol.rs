//! Acquire/release decision logic shared by both lock tiers
//!
//! Callers run these inside the syncer's critical section for the asset.

use chrono::Utc;
use tracing::{debug, warn};

use super::event::LockEvent;
use super::repository_trait::LockRepositoryTrait;
use super::types::{Identity, LockEntry, LockRecord, LockResult};
use crate::domain::events::EventPublisher;
use crate::error::{Error, Result};

/// Find, decide, persist
///
/// A unique violation on insert means another node saved the asset first;
/// the winner's row is re-read and reported like any existing lock.
pub(crate) async fn acquire(
    repository: &dyn LockRepositoryTrait,
    publisher: Option<&dyn EventPublisher>,
    asset: &str,
    requester: &Identity,
) -> Result<LockResult> {
    if let Some(existing) = repository.find_lock(asset).await? {
        return Ok(decide_existing(repository, publisher, existing, requester).await);
    }

    let record = repository.create_lock(asset, requester);
    match repository.save_lock(&record).await {
        Ok(()) => {
            debug!(
                asset = %asset,
                owner = %requester,
                tier = %repository.tier(),
                "Lock acquired"
            );
            publish(
                publisher,
                LockEvent::lock_acquired(asset, repository.tier(), requester),
            )
            .await;
            Ok(LockResult::acquired(record.to_entry()))
        }
        Err(e) if e.is_unique_violation() => {
            debug!(asset = %asset, "Lost insert race, reading winning lock");
            match repository.find_lock(asset).await? {
                Some(winner) => Ok(decide_existing(repository, publisher, winner, requester).await),
                // The winner released before we could read it back
                None => Err(e),
            }
        }
        Err(e) => Err(e),
    }
}

async fn decide_existing(
    repository: &dyn LockRepositoryTrait,
    publisher: Option<&dyn EventPublisher>,
    existing: LockRecord,
    requester: &Identity,
) -> LockResult {
    if existing.owner == *requester {
        debug!(asset = %existing.asset, owner = %requester, "Lock reacquired by holder");
        publish(
            publisher,
            LockEvent::lock_reacquired(&existing.asset, repository.tier(), requester),
        )
        .await;
        LockResult::acquired(existing.to_entry())
    } else {
        debug!(
            asset = %existing.asset,
            holder = %existing.owner,
            requester = %requester,
            "Lock is held by someone else"
        );
        publish(
            publisher,
            LockEvent::lock_contention(
                &existing.asset,
                repository.tier(),
                &existing.owner,
                requester,
            ),
        )
        .await;
        LockResult::conflict(existing.to_entry())
    }
}

/// Delete the live lock for `entry` if `entry`'s owner still holds it
pub(crate) async fn release(
    repository: &dyn LockRepositoryTrait,
    publisher: Option<&dyn EventPublisher>,
    entry: &LockEntry,
) -> Result<()> {
    let Some(current) = repository.find_lock(entry.asset()).await? else {
        debug!(asset = %entry.asset(), "Lock already released");
        return Ok(());
    };

    if current.owner != *entry.owner() {
        return Err(ownership_violation(current, entry));
    }

    if !repository.delete_lock(&current).await? {
        // Another node changed the row between our read and the delete
        return match repository.find_lock(entry.asset()).await? {
            Some(now) if now.owner != *entry.owner() => Err(ownership_violation(now, entry)),
            _ => {
                debug!(asset = %entry.asset(), "Lock already released");
                Ok(())
            }
        };
    }

    let held_ms = Utc::now().timestamp_millis() - current.created_at.timestamp_millis();
    debug!(asset = %current.asset, owner = %current.owner, held_ms = held_ms, "Lock released");
    publish(
        publisher,
        LockEvent::lock_released(&current.asset, repository.tier(), &current.owner, held_ms),
    )
    .await;
    Ok(())
}

fn ownership_violation(current: LockRecord, entry: &LockEntry) -> Error {
    warn!(
        asset = %entry.asset(),
        holder = %current.owner,
        releaser = %entry.owner(),
        "Refusing to release a lock held by someone else"
    );
    Error::LockOwnershipViolation {
        asset: current.asset,
        holder: current.owner.to_string(),
        releaser: entry.owner().to_string(),
    }
}

/// Publish without letting a publisher failure affect the lock outcome
pub(crate) async fn publish(publisher: Option<&dyn EventPublisher>, event: LockEvent) {
    if let Some(publisher) = publisher {
        if let Err(e) = publisher.publish(&event).await {
            warn!(event_type = %event.event_type, error = %e, "Failed to publish lock event");
        }
    }
}
