//! In-process bus for session lifecycle events

use tokio::sync::broadcast;
use tracing::trace;

use super::event::SessionLifecycleEvent;

/// Default number of buffered events per subscriber
const DEFAULT_CAPACITY: usize = 256;

/// Fan-out channel for [`SessionLifecycleEvent`]s
///
/// Cloning yields another handle to the same bus.
#[derive(Debug, Clone)]
pub struct SessionEventBus {
    tx: broadcast::Sender<SessionLifecycleEvent>,
}

impl SessionEventBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Publish an event; returns how many subscribers will see it
    ///
    /// Publishing with no subscribers is fine and returns 0.
    pub fn publish(&self, event: SessionLifecycleEvent) -> usize {
        trace!(event = %event, "Publishing session event");
        self.tx.send(event).unwrap_or(0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionLifecycleEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for SessionEventBus {
    fn default() -> Self {
        Self::new()
    }
}
