//! Domain event infrastructure
//!
//! Provides base traits and types for domain events. Events provide an audit
//! trail of lock activity and decouple observers from the lock service.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{PoisonError, RwLock};
use uuid::Uuid;

use crate::error::Result;

/// Base trait for all domain events
///
/// Domain events represent something that happened in the domain.
/// They are immutable facts about the past.
pub trait DomainEvent: Send + Sync {
    /// Get the event type as a string
    fn event_type(&self) -> &str;

    /// Get the aggregate this event belongs to (for locks: the asset key)
    fn aggregate_id(&self) -> &str;

    /// Get the timestamp when this event occurred
    fn timestamp(&self) -> DateTime<Utc>;

    /// Get optional event data as JSON
    fn data(&self) -> Option<&serde_json::Value>;
}

/// Publisher trait for emitting domain events
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publish a domain event
    async fn publish(&self, event: &dyn DomainEvent) -> Result<()>;
}

/// A simple in-memory event store for recording events
#[derive(Debug, Default)]
pub struct InMemoryEventStore {
    events: RwLock<Vec<StoredEvent>>,
}

/// A stored event record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredEvent {
    /// Unique event ID
    pub id: Uuid,
    /// Aggregate this event belongs to
    pub aggregate_id: String,
    /// Event type string
    pub event_type: String,
    /// Event data as JSON
    pub data: Option<serde_json::Value>,
    /// When the event was created
    pub created_at: DateTime<Utc>,
}

impl StoredEvent {
    /// Create a new stored event
    pub fn new(
        aggregate_id: impl Into<String>,
        event_type: impl Into<String>,
        data: Option<serde_json::Value>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            aggregate_id: aggregate_id.into(),
            event_type: event_type.into(),
            data,
            created_at: Utc::now(),
        }
    }

    /// Create from a domain event
    pub fn from_event(event: &dyn DomainEvent) -> Self {
        Self {
            id: Uuid::new_v4(),
            aggregate_id: event.aggregate_id().to_string(),
            event_type: event.event_type().to_string(),
            data: event.data().cloned(),
            created_at: event.timestamp(),
        }
    }
}

impl InMemoryEventStore {
    /// Create a new in-memory event store
    pub fn new() -> Self {
        Self::default()
    }

    /// Store an event
    pub fn store(&self, event: StoredEvent) {
        self.events
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }

    /// Get events for an aggregate
    pub fn events_for(&self, aggregate_id: &str) -> Vec<StoredEvent> {
        self.events
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|e| e.aggregate_id == aggregate_id)
            .cloned()
            .collect()
    }

    /// Get all events
    pub fn all_events(&self) -> Vec<StoredEvent> {
        self.events
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Get events by type
    pub fn events_by_type(&self, event_type: &str) -> Vec<StoredEvent> {
        self.events
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|e| e.event_type == event_type)
            .cloned()
            .collect()
    }

    /// Clear all events
    pub fn clear(&self) {
        self.events
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

#[async_trait]
impl EventPublisher for InMemoryEventStore {
    async fn publish(&self, event: &dyn DomainEvent) -> Result<()> {
        self.store(StoredEvent::from_event(event));
        Ok(())
    }
}
