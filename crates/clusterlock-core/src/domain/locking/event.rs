//! Locking domain events
//!
//! Events for tracking lock-related activities.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::types::{Identity, LockTier};
use crate::domain::events::DomainEvent;

/// Type of lock event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockEventType {
    /// A free asset was locked
    LockAcquired,
    /// The holder acquired its own lock again
    LockReacquired,
    /// Someone else tried to acquire a held lock
    LockContention,
    /// A lock was released by its holder
    LockReleased,
    /// All locks of an identity were removed by a sweep
    LocksSwept,
}

impl LockEventType {
    /// Convert to string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LockAcquired => "lock_acquired",
            Self::LockReacquired => "lock_reacquired",
            Self::LockContention => "lock_contention",
            Self::LockReleased => "lock_released",
            Self::LocksSwept => "locks_swept",
        }
    }
}

impl std::fmt::Display for LockEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A locking domain event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockEvent {
    /// Unique event identifier
    pub id: Uuid,
    /// The asset key, or `identity:<key>` for sweeps
    pub aggregate_id: String,
    /// Type of event
    pub event_type: LockEventType,
    /// Event data
    pub data: Option<serde_json::Value>,
    /// When the event occurred
    pub created_at: DateTime<Utc>,
}

impl LockEvent {
    /// Create a new lock event
    pub fn new(
        aggregate_id: impl Into<String>,
        event_type: LockEventType,
        data: Option<serde_json::Value>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            aggregate_id: aggregate_id.into(),
            event_type,
            data,
            created_at: Utc::now(),
        }
    }

    pub fn lock_acquired(asset: &str, tier: LockTier, holder: &Identity) -> Self {
        let data = serde_json::json!({
            "tier": tier.as_str(),
            "holder_key": holder.key,
            "holder_name": holder.name,
        });
        Self::new(asset, LockEventType::LockAcquired, Some(data))
    }

    pub fn lock_reacquired(asset: &str, tier: LockTier, holder: &Identity) -> Self {
        let data = serde_json::json!({
            "tier": tier.as_str(),
            "holder_key": holder.key,
            "holder_name": holder.name,
        });
        Self::new(asset, LockEventType::LockReacquired, Some(data))
    }

    pub fn lock_contention(
        asset: &str,
        tier: LockTier,
        current_holder: &Identity,
        blocked: &Identity,
    ) -> Self {
        let data = serde_json::json!({
            "tier": tier.as_str(),
            "current_holder": current_holder.name,
            "blocked_holder": blocked.name,
        });
        Self::new(asset, LockEventType::LockContention, Some(data))
    }

    pub fn lock_released(asset: &str, tier: LockTier, holder: &Identity, held_ms: i64) -> Self {
        let data = serde_json::json!({
            "tier": tier.as_str(),
            "holder_name": holder.name,
            "held_ms": held_ms,
        });
        Self::new(asset, LockEventType::LockReleased, Some(data))
    }

    pub fn locks_swept(owner: &Identity, tier: LockTier, removed: u64) -> Self {
        let data = serde_json::json!({
            "tier": tier.as_str(),
            "holder_name": owner.name,
            "removed": removed,
        });
        Self::new(
            format!("identity:{}", owner.key),
            LockEventType::LocksSwept,
            Some(data),
        )
    }
}

impl DomainEvent for LockEvent {
    fn event_type(&self) -> &str {
        self.event_type.as_str()
    }

    fn aggregate_id(&self) -> &str {
        &self.aggregate_id
    }

    fn timestamp(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn data(&self) -> Option<&serde_json::Value> {
        self.data.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_acquired_event() {
        let event = LockEvent::lock_acquired(
            "Course::1",
            LockTier::Session,
            &Identity::new(1, "alice"),
        );

        assert_eq!(event.aggregate_id, "Course::1");
        assert_eq!(event.event_type, LockEventType::LockAcquired);

        let data = event.data.unwrap();
        assert_eq!(data["holder_name"], "alice");
        assert_eq!(data["tier"], "session");
    }

    #[test]
    fn test_lock_contention_event() {
        let event = LockEvent::lock_contention(
            "Course::1",
            LockTier::Persistent,
            &Identity::new(1, "alice"),
            &Identity::new(2, "bob"),
        );

        assert_eq!(event.event_type, LockEventType::LockContention);

        let data = event.data.unwrap();
        assert_eq!(data["current_holder"], "alice");
        assert_eq!(data["blocked_holder"], "bob");
    }

    #[test]
    fn test_locks_swept_event() {
        let event = LockEvent::locks_swept(&Identity::new(9, "carol"), LockTier::Session, 3);

        assert_eq!(event.aggregate_id, "identity:9");
        assert_eq!(event.data.unwrap()["removed"], 3);
    }

    #[test]
    fn test_domain_event_impl() {
        let event = LockEvent::lock_released(
            "Course::1",
            LockTier::Session,
            &Identity::new(1, "alice"),
            1500,
        );
        assert_eq!(event.event_type(), "lock_released");
        assert_eq!(DomainEvent::aggregate_id(&event), "Course::1");
    }
}
