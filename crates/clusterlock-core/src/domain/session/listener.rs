//! Scoped subscriptions to the session event bus
//!
//! A listener is a spawned task feeding bus events to a handler. It lives
//! until [`SessionListenerHandle::stop`] is called or the handle is dropped.
//! Events published before that point are still delivered; later ones are
//! not.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::bus::SessionEventBus;
use super::event::SessionLifecycleEvent;

/// Reacts to session lifecycle events
#[async_trait]
pub trait SessionLifecycleHandler: Send + Sync + 'static {
    async fn on_session_event(&self, event: &SessionLifecycleEvent);
}

/// Handle to a running listener task
#[derive(Debug)]
pub struct SessionListenerHandle {
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl SessionListenerHandle {
    /// Subscribe `handler` to `bus` and start delivering events
    pub fn spawn(bus: &SessionEventBus, handler: Arc<dyn SessionLifecycleHandler>) -> Self {
        let mut rx = bus.subscribe();
        let cancel = CancellationToken::new();
        let token = cancel.clone();

        let task = tokio::spawn(async move {
            debug!("Session listener started");
            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => {
                        drain(&mut rx, handler.as_ref()).await;
                        break;
                    }
                    received = rx.recv() => match received {
                        Ok(event) => handler.on_session_event(&event).await,
                        Err(RecvError::Lagged(skipped)) => {
                            warn!(skipped = skipped, "Session listener lagged; events were dropped");
                        }
                        Err(RecvError::Closed) => break,
                    },
                }
            }
            debug!("Session listener stopped");
        });

        Self {
            cancel,
            task: Some(task),
        }
    }

    /// Whether the listener task is still running
    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Unsubscribe and wait until events already published are handled
    pub async fn stop(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!(error = %e, "Session listener task ended abnormally");
            }
        }
    }
}

/// Deliver whatever is already queued for `rx`
async fn drain(
    rx: &mut broadcast::Receiver<SessionLifecycleEvent>,
    handler: &dyn SessionLifecycleHandler,
) {
    loop {
        match rx.try_recv() {
            Ok(event) => handler.on_session_event(&event).await,
            Err(TryRecvError::Lagged(skipped)) => {
                warn!(skipped = skipped, "Session listener lagged; events were dropped");
            }
            Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
        }
    }
}

impl Drop for SessionListenerHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::locking::Identity;
    use std::time::Duration;
    use tokio::sync::mpsc;

    struct Forwarder(mpsc::UnboundedSender<SessionLifecycleEvent>);

    #[async_trait]
    impl SessionLifecycleHandler for Forwarder {
        async fn on_session_event(&self, event: &SessionLifecycleEvent) {
            let _ = self.0.send(event.clone());
        }
    }

    #[tokio::test]
    async fn test_listener_delivers_until_stopped() {
        let bus = SessionEventBus::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let handle = SessionListenerHandle::spawn(&bus, Arc::new(Forwarder(tx)));
        assert!(handle.is_running());
        assert_eq!(bus.subscriber_count(), 1);

        let event = SessionLifecycleEvent::signed_off(Identity::new(1, "alice"));
        bus.publish(event.clone());

        let received = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("listener should forward the event")
            .unwrap();
        assert_eq!(received, event);

        handle.stop().await;
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_dropping_handle_cancels_listener() {
        let bus = SessionEventBus::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let handle = SessionListenerHandle::spawn(&bus, Arc::new(Forwarder(tx)));
        drop(handle);

        // The task exits and drops the handler, closing the channel
        let closed = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("listener should shut down");
        assert!(closed.is_none());
    }

    #[tokio::test]
    async fn test_stop_delivers_queued_events() {
        let bus = SessionEventBus::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let handle = SessionListenerHandle::spawn(&bus, Arc::new(Forwarder(tx)));

        bus.publish(SessionLifecycleEvent::signed_off(Identity::new(1, "alice")));
        bus.publish(SessionLifecycleEvent::signed_off(Identity::new(2, "bob")));
        handle.stop().await;

        let mut keys = Vec::new();
        while let Some(event) = rx.recv().await {
            keys.push(event.identity().key);
        }
        assert_eq!(keys, vec![1, 2]);
    }

    /// Blocks until told to continue, so the bus can overrun the receiver
    struct Gated {
        seen: mpsc::UnboundedSender<i64>,
        gate: Arc<tokio::sync::Semaphore>,
    }

    #[async_trait]
    impl SessionLifecycleHandler for Gated {
        async fn on_session_event(&self, event: &SessionLifecycleEvent) {
            if let Ok(permit) = self.gate.acquire().await {
                permit.forget();
            }
            let _ = self.seen.send(event.identity().key);
        }
    }

    #[tokio::test]
    async fn test_lagging_listener_skips_and_keeps_running() {
        let bus = SessionEventBus::with_capacity(1);
        let gate = Arc::new(tokio::sync::Semaphore::new(0));
        let (seen_tx, mut seen_rx) = mpsc::unbounded_channel();
        let handle = SessionListenerHandle::spawn(
            &bus,
            Arc::new(Gated {
                seen: seen_tx,
                gate: gate.clone(),
            }),
        );

        // The first event is taken and parks the handler
        bus.publish(SessionLifecycleEvent::signed_off(Identity::new(1, "a")));
        tokio::time::sleep(Duration::from_millis(50)).await;

        // Overrun the single-slot buffer while the handler is parked
        for key in 2..=4 {
            bus.publish(SessionLifecycleEvent::signed_off(Identity::new(key, "x")));
        }
        gate.add_permits(10);

        let first = tokio::time::timeout(Duration::from_secs(5), seen_rx.recv())
            .await
            .unwrap()
            .unwrap();
        let next = tokio::time::timeout(Duration::from_secs(5), seen_rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first, 1);
        // Events 2 and 3 were overwritten; only the newest survives
        assert_eq!(next, 4);
        assert!(handle.is_running());

        handle.stop().await;
    }
}
