//! Availability watch loop.
//!
//! Consumes the store's change-feed for the available namespace and keeps the
//! [`AvailabilityHeap`] in step: Put pushes, Delete removes. The loop is the
//! only writer driven by external state; the coordinator only pops (and
//! requeues after transient failures).
//!
//! The loop ends in one of two ways. Cancellation through the shutdown channel
//! returns `Ok(())`. Anything else (a broken feed, a feed that simply ends) is
//! a `WatchDisrupted` failure, reported on the health and readiness probes
//! before the task returns.

use super::address::Address;
use super::heap::AvailabilityHeap;
use super::keys::PoolKeys;
use crate::core::error::{PoolError, PoolResult};
use crate::ops::observability::{HealthProbe, PoolMetrics, ReadinessProbe};
use crate::store::{EventKind, WatchEvent, WatchStream};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Effect of a single watch event on the heap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchOutcome {
    /// Put of an address not yet cached.
    Pushed(Address),
    /// Put of an address already cached; replayed events land here.
    AlreadyPresent(Address),
    /// Delete of a cached address.
    Removed(Address),
    /// Delete of an address not cached, typically one popped locally.
    Absent(Address),
    /// Key did not decode to an address.
    Skipped,
}

/// Applies availability events to a shared heap.
#[derive(Debug, Clone)]
pub struct PoolWatcher {
    heap: Arc<AvailabilityHeap>,
    keys: PoolKeys,
    metrics: Arc<PoolMetrics>,
    health: Arc<HealthProbe>,
    readiness: Arc<ReadinessProbe>,
}

impl PoolWatcher {
    /// Create a watcher with private metrics and probes.
    pub fn new(heap: Arc<AvailabilityHeap>, keys: PoolKeys) -> Self {
        Self {
            heap,
            keys,
            metrics: Arc::new(PoolMetrics::new()),
            health: Arc::new(HealthProbe::new()),
            readiness: Arc::new(ReadinessProbe::new()),
        }
    }

    /// Report through shared metrics and probes.
    pub fn with_observability(
        mut self,
        metrics: Arc<PoolMetrics>,
        health: Arc<HealthProbe>,
        readiness: Arc<ReadinessProbe>,
    ) -> Self {
        self.metrics = metrics;
        self.health = health;
        self.readiness = readiness;
        self
    }

    pub fn health(&self) -> &Arc<HealthProbe> {
        &self.health
    }

    /// Apply one event to the heap.
    pub fn apply(&self, event: &WatchEvent) -> WatchOutcome {
        let Some(addr) = self.keys.decode_available(&event.key) else {
            tracing::warn!(
                key = %String::from_utf8_lossy(&event.key),
                revision = event.revision,
                "skipping malformed availability key"
            );
            self.metrics.record_malformed_key();
            return WatchOutcome::Skipped;
        };

        let outcome = match event.kind {
            EventKind::Put if self.heap.push(addr) => WatchOutcome::Pushed(addr),
            EventKind::Put => WatchOutcome::AlreadyPresent(addr),
            EventKind::Delete if self.heap.remove(&addr) => WatchOutcome::Removed(addr),
            EventKind::Delete => WatchOutcome::Absent(addr),
        };

        self.metrics.record_watch_event();
        self.metrics.set_heap_size(self.heap.len());
        tracing::debug!(
            address = %addr,
            revision = event.revision,
            outcome = ?outcome,
            "applied availability event"
        );
        outcome
    }

    /// Run the loop on a background task.
    pub fn spawn(self, stream: WatchStream, shutdown: watch::Receiver<bool>) -> WatcherHandle {
        self.readiness.update_component(|c| c.watcher = true);
        WatcherHandle {
            task: Some(tokio::spawn(self.run(stream, shutdown))),
            outcome: None,
        }
    }

    async fn run(self, mut stream: WatchStream, mut shutdown: watch::Receiver<bool>) -> PoolResult<()> {
        tracing::info!("availability watcher started");

        loop {
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                next = stream.next() => match next {
                    Some(Ok(event)) => {
                        self.apply(&event);
                    }
                    Some(Err(err)) => return Err(self.disrupted(err.to_string())),
                    None => return Err(self.disrupted("watch feed ended")),
                },
            }
        }

        stream.cancel();
        self.readiness.update_component(|c| c.watcher = false);
        tracing::info!("availability watcher stopped");
        Ok(())
    }

    fn disrupted(&self, message: impl Into<String>) -> PoolError {
        let message = message.into();
        tracing::error!(error = %message, "availability watch disrupted");
        self.health
            .set_unhealthy(format!("availability watch disrupted: {}", message));
        self.readiness.update_component(|c| c.watcher = false);
        PoolError::watch_disrupted(message)
    }
}

/// Handle to a running watcher task.
#[derive(Debug)]
pub struct WatcherHandle {
    task: Option<JoinHandle<PoolResult<()>>>,
    outcome: Option<PoolResult<()>>,
}

impl WatcherHandle {
    /// Wait for the watcher to stop.
    ///
    /// `Ok(())` only after cancellation. Safe to call again after it returns,
    /// and safe to drop mid-wait.
    pub async fn join(&mut self) -> PoolResult<()> {
        if let Some(task) = self.task.as_mut() {
            let outcome = match task.await {
                Ok(outcome) => outcome,
                Err(e) => Err(PoolError::watch_disrupted(format!("watcher task failed: {}", e))),
            };
            self.task = None;
            self.outcome = Some(outcome);
        }
        self.outcome.clone().unwrap_or(Ok(()))
    }

    /// Check if the watcher task has stopped.
    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, |t| t.is_finished())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::StoreError;

    fn addr(s: &str) -> Address {
        s.parse().unwrap()
    }

    fn watcher() -> (PoolWatcher, Arc<AvailabilityHeap>, PoolKeys) {
        let heap = Arc::new(AvailabilityHeap::new());
        let keys = PoolKeys::default();
        (PoolWatcher::new(heap.clone(), keys.clone()), heap, keys)
    }

    #[test]
    fn test_put_and_replayed_put() {
        let (watcher, heap, keys) = watcher();
        let key = keys.available(&addr("10.0.0.2"));

        assert_eq!(watcher.apply(&WatchEvent::put(key.clone(), 1)), WatchOutcome::Pushed(addr("10.0.0.2")));
        assert_eq!(
            watcher.apply(&WatchEvent::put(key, 1)),
            WatchOutcome::AlreadyPresent(addr("10.0.0.2"))
        );
        assert_eq!(heap.len(), 1);
    }

    #[test]
    fn test_delete_of_unknown_address_is_noop() {
        let (watcher, heap, keys) = watcher();
        let outcome = watcher.apply(&WatchEvent::delete(keys.available(&addr("10.0.0.7")), 4));
        assert_eq!(outcome, WatchOutcome::Absent(addr("10.0.0.7")));
        assert!(heap.is_empty());
    }

    #[test]
    fn test_delete_removes() {
        let (watcher, heap, keys) = watcher();
        heap.push(addr("10.0.0.3"));
        let outcome = watcher.apply(&WatchEvent::delete(keys.available(&addr("10.0.0.3")), 2));
        assert_eq!(outcome, WatchOutcome::Removed(addr("10.0.0.3")));
        assert!(heap.is_empty());
    }

    #[test]
    fn test_malformed_key_skipped() {
        let (watcher, heap, _) = watcher();
        let outcome = watcher.apply(&WatchEvent::put("/ip-pool/available/garbage", 1));
        assert_eq!(outcome, WatchOutcome::Skipped);
        assert!(heap.is_empty());
        assert_eq!(
            watcher
                .metrics
                .registry()
                .counter_get(crate::ops::observability::metrics::MALFORMED_KEYS_TOTAL),
            1
        );
    }

    #[tokio::test]
    async fn test_cancellation_returns_ok() {
        let (watcher, _, _) = watcher();
        let (_feed, stream) = WatchStream::channel(8);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let mut handle = watcher.clone().spawn(stream, shutdown_rx);
        shutdown_tx.send(true).unwrap();
        assert_eq!(handle.join().await, Ok(()));
        assert!(watcher.health().is_healthy());
        assert!(handle.is_finished());
    }

    #[tokio::test]
    async fn test_feed_error_is_disruption() {
        let (watcher, heap, keys) = watcher();
        let (feed, stream) = WatchStream::channel(8);
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);

        let mut handle = watcher.clone().spawn(stream, shutdown_rx);
        assert!(feed.send(Ok(WatchEvent::put(keys.available(&addr("10.0.0.4")), 1))).await);
        feed.fail(StoreError::disrupted("connection reset")).await;

        let err = handle.join().await.unwrap_err();
        assert!(err.is_liveness_failure());
        assert!(!watcher.health().is_healthy());
        assert!(heap.contains(&addr("10.0.0.4")));

        // A second join reports the same outcome.
        assert_eq!(handle.join().await, Err(err));
    }

    #[tokio::test]
    async fn test_feed_end_is_disruption() {
        let (watcher, _, _) = watcher();
        let (feed, stream) = WatchStream::channel(8);
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);

        let mut handle = watcher.spawn(stream, shutdown_rx);
        drop(feed);
        assert!(matches!(handle.join().await, Err(PoolError::WatchDisrupted { .. })));
    }
}
