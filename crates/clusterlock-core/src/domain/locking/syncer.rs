//! Per-asset critical sections within one process
//!
//! The syncer keeps one async mutex per asset key. Work for the same key is
//! serialized; work for different keys runs concurrently. Entries are created
//! on first use and removed once nobody holds or waits on them.
//!
//! This gives no cross-process exclusion. That comes from the store's unique
//! asset key.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, PoisonError};
use tokio::sync::Mutex;
use tracing::trace;

type SectionMap = std::sync::Mutex<HashMap<String, Arc<Mutex<()>>>>;

/// Runs units of work exclusively per key
#[derive(Debug, Default)]
pub struct Syncer {
    // Only held for map lookups, never across an await
    locks: SectionMap,
}

impl Syncer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `work` while holding the critical section for `key`
    ///
    /// Waiters are not served in FIFO order. There is no timeout, so keep
    /// `work` short. Dropping the returned future releases the section.
    pub async fn run_exclusive<F, Fut, R>(&self, key: &str, work: F) -> R
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = R>,
    {
        let lease = self.lease(key);
        let _guard = lease.section().lock_owned().await;
        trace!(key = %key, "Entered critical section");
        work().await
    }

    /// Number of keys with a live critical section
    pub fn active_keys(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn lease<'a>(&'a self, key: &'a str) -> SectionLease<'a> {
        let section = self
            .locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();

        SectionLease {
            syncer: self,
            key,
            section,
        }
    }

    /// Remove `key` if the caller's lease is the only reference left
    fn prune(&self, key: &str) {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        // Leases are only created under the map lock and every other clone
        // belongs to a live lease, so a count of two (map plus the departing
        // lease) means nobody holds or waits on the section.
        if locks
            .get(key)
            .is_some_and(|section| Arc::strong_count(section) == 2)
        {
            locks.remove(key);
        }
    }
}

/// A reference to one key's section; prunes the map entry when dropped,
/// including when the surrounding future is cancelled
struct SectionLease<'a> {
    syncer: &'a Syncer,
    key: &'a str,
    section: Arc<Mutex<()>>,
}

impl SectionLease<'_> {
    fn section(&self) -> Arc<Mutex<()>> {
        self.section.clone()
    }
}

impl Drop for SectionLease<'_> {
    fn drop(&mut self) {
        self.syncer.prune(self.key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_returns_work_result() {
        let syncer = Syncer::new();
        let value = syncer.run_exclusive("a", || async { 41 + 1 }).await;
        assert_eq!(value, 42);
        assert_eq!(syncer.active_keys(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_same_key_is_serialized() {
        let syncer = Arc::new(Syncer::new());
        let inside = Arc::new(AtomicUsize::new(0));
        let max_inside = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..16 {
            let syncer = syncer.clone();
            let inside = inside.clone();
            let max_inside = max_inside.clone();
            handles.push(tokio::spawn(async move {
                syncer
                    .run_exclusive("Course::1", || async {
                        let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                        max_inside.fetch_max(now, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(2)).await;
                        inside.fetch_sub(1, Ordering::SeqCst);
                    })
                    .await;
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(max_inside.load(Ordering::SeqCst), 1);
        assert_eq!(syncer.active_keys(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_different_keys_run_concurrently() {
        let syncer = Arc::new(Syncer::new());
        let (entered_tx, entered_rx) = tokio::sync::oneshot::channel::<()>();
        let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();

        let holder = {
            let syncer = syncer.clone();
            tokio::spawn(async move {
                syncer
                    .run_exclusive("Course::1", || async move {
                        entered_tx.send(()).unwrap();
                        release_rx.await.unwrap();
                    })
                    .await;
            })
        };

        entered_rx.await.unwrap();
        assert_eq!(syncer.active_keys(), 1);

        // Would deadlock if "Course::2" shared the held section
        let other = tokio::time::timeout(
            Duration::from_secs(5),
            syncer.run_exclusive("Course::2", || async { "done" }),
        )
        .await
        .expect("different key must not block");
        assert_eq!(other, "done");

        release_tx.send(()).unwrap();
        holder.await.unwrap();
        assert_eq!(syncer.active_keys(), 0);
    }

    #[tokio::test]
    async fn test_cancelled_work_releases_section() {
        let syncer = Syncer::new();

        let timed_out = tokio::time::timeout(
            Duration::from_millis(20),
            syncer.run_exclusive("Course::1", || std::future::pending::<()>()),
        )
        .await;
        assert!(timed_out.is_err());
        assert_eq!(syncer.active_keys(), 0);

        // The section is free again
        let value = tokio::time::timeout(
            Duration::from_secs(5),
            syncer.run_exclusive("Course::1", || async { 7 }),
        )
        .await
        .expect("section must not stay held");
        assert_eq!(value, 7);
    }
}
