//! Embedded pool store.
//!
//! A [`KvStateMachine`] behind a mutex, with committed changes fanned out to
//! watch subscribers over a broadcast channel. When opened with a path, every
//! committed transaction is appended to a [`Journal`] before it becomes
//! visible, so a restart recovers exactly the committed state. Only one
//! handle may have a path open at a time.

use super::journal::{Journal, JournalEntry, JournalOptions};
use super::state_machine::{event_counts, KvStateMachine, TxnOutcome};
use super::{Condition, KeyValue, PoolStore, StoreFuture, TxnOp, WatchEvent, WatchStream};
use crate::core::error::{StoreError, StoreResult};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::watch;

/// Default per-subscriber event buffer.
pub const DEFAULT_WATCH_BUFFER: usize = 1024;

/// State and event fan-out, shared with blocking commit tasks.
struct Shared {
    state: Mutex<KvStateMachine>,
    events: broadcast::Sender<WatchEvent>,
}

impl Shared {
    fn publish(&self, outcome: TxnOutcome) -> bool {
        match outcome {
            TxnOutcome::Committed { revision, events } => {
                let (puts, deletes) = event_counts(&events);
                tracing::trace!(revision, puts, deletes, "embedded txn committed");
                for event in events {
                    // No receivers is not an error.
                    let _ = self.events.send(event);
                }
                true
            }
            TxnOutcome::Rejected => false,
        }
    }

    /// Events go out under the state lock so subscribers see revision order.
    fn commit_volatile(&self, conditions: &[Condition], ops: &[TxnOp]) -> bool {
        let mut state = self.state.lock();
        let outcome = state.apply_txn(conditions, ops);
        self.publish(outcome)
    }

    /// Check, journal, then apply. Holding the journal lock serializes
    /// writers, so the check still holds when the transaction is applied.
    fn commit_durable(
        &self,
        journal: &Mutex<Journal>,
        conditions: &[Condition],
        ops: &[TxnOp],
    ) -> StoreResult<bool> {
        let mut journal = journal.lock();
        let revision = {
            let state = self.state.lock();
            if !state.check(conditions) {
                return Ok(false);
            }
            state.current_revision() + 1
        };

        journal.append(&JournalEntry {
            revision,
            ops: ops.to_vec(),
        })?;
        let committed = {
            let mut state = self.state.lock();
            let outcome = state.apply_txn(conditions, ops);
            self.publish(outcome)
        };

        if journal.needs_compaction() {
            let snapshot = self.state.lock().snapshot();
            if let Err(e) = journal.compact(&snapshot) {
                // The journal still holds every entry.
                tracing::warn!(error = %e, "embedded store compaction failed");
            }
        }
        Ok(committed)
    }

    fn compact(&self, journal: &Mutex<Journal>) -> StoreResult<()> {
        let mut journal = journal.lock();
        let snapshot = self.state.lock().snapshot();
        journal.compact(&snapshot)
    }
}

/// In-process pool store with optional journal persistence.
pub struct MemoryPoolStore {
    shared: Arc<Shared>,
    journal: Option<Arc<Mutex<Journal>>>,
    path: Option<PathBuf>,
    watch_buffer: usize,
    /// Fault injection: every call fails with `Unavailable` while set.
    unavailable: AtomicBool,
    /// Fault injection: artificial delay before each call, in milliseconds.
    latency_ms: AtomicU64,
    /// Bumped to break every open subscription.
    disruptions: watch::Sender<u64>,
}

impl MemoryPoolStore {
    /// Create a volatile store.
    pub fn new() -> Self {
        Self::with_state(KvStateMachine::new(), None, None, DEFAULT_WATCH_BUFFER)
    }

    /// Open a store persisted at `path` with default journal options.
    pub fn open(path: impl Into<PathBuf>, watch_buffer: usize) -> StoreResult<Self> {
        Self::open_with_options(path, watch_buffer, JournalOptions::default())
    }

    /// Open a store persisted at `path`, recovering its snapshot and journal.
    ///
    /// Fails with `Unavailable` while another handle has `path` open.
    pub fn open_with_options(
        path: impl Into<PathBuf>,
        watch_buffer: usize,
        options: JournalOptions,
    ) -> StoreResult<Self> {
        let path = path.into();
        let (journal, state) = Journal::open(&path, options)?;

        tracing::info!(
            path = %path.display(),
            revision = state.current_revision(),
            keys = state.len(),
            replayed = journal.entries(),
            "opened embedded pool store"
        );

        Ok(Self::with_state(
            state,
            Some(journal),
            Some(path),
            watch_buffer,
        ))
    }

    fn with_state(
        state: KvStateMachine,
        journal: Option<Journal>,
        path: Option<PathBuf>,
        watch_buffer: usize,
    ) -> Self {
        let watch_buffer = watch_buffer.max(1);
        let (events, _) = broadcast::channel(watch_buffer);
        let (disruptions, _) = watch::channel(0);
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(state),
                events,
            }),
            journal: journal.map(|j| Arc::new(Mutex::new(j))),
            path,
            watch_buffer,
            unavailable: AtomicBool::new(false),
            latency_ms: AtomicU64::new(0),
            disruptions,
        }
    }

    /// Make every subsequent call fail with `Unavailable` (or stop doing so).
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Delay every subsequent call by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        let ms = u64::try_from(latency.as_millis()).unwrap_or(u64::MAX);
        self.latency_ms.store(ms, Ordering::SeqCst);
    }

    /// Break every open watch subscription with a `Disrupted` error.
    pub fn disrupt_watches(&self) {
        self.disruptions.send_modify(|generation| *generation += 1);
    }

    /// Current store revision.
    pub fn revision(&self) -> u64 {
        self.shared.state.lock().current_revision()
    }

    /// Number of live keys.
    pub fn key_count(&self) -> usize {
        self.shared.state.lock().len()
    }

    /// Path of the snapshot file, if persistent.
    pub fn snapshot_path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    async fn gate(&self) -> StoreResult<()> {
        let latency = self.latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::unavailable("embedded store marked unavailable"));
        }
        Ok(())
    }

    /// Run journal I/O on the blocking pool.
    async fn with_journal<T, F>(&self, work: F) -> StoreResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Shared, &Mutex<Journal>) -> StoreResult<T> + Send + 'static,
    {
        let Some(journal) = self.journal.clone() else {
            return Err(StoreError::unavailable("embedded store has no journal"));
        };
        let shared = self.shared.clone();
        tokio::task::spawn_blocking(move || work(&*shared, &*journal))
            .await
            .map_err(|e| StoreError::unavailable(format!("journal task failed: {}", e)))?
    }
}

impl Default for MemoryPoolStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemoryPoolStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryPoolStore")
            .field("path", &self.path)
            .field("revision", &self.revision())
            .finish()
    }
}

impl PoolStore for MemoryPoolStore {
    fn list_prefix<'a>(&'a self, prefix: &'a [u8]) -> StoreFuture<'a, Vec<KeyValue>> {
        Box::pin(async move {
            self.gate().await?;
            Ok(self.shared.state.lock().range_prefix(prefix))
        })
    }

    fn get<'a>(&'a self, key: &'a [u8]) -> StoreFuture<'a, Option<Vec<u8>>> {
        Box::pin(async move {
            self.gate().await?;
            Ok(self.shared.state.lock().get(key).map(|r| r.value.clone()))
        })
    }

    fn watch_prefix<'a>(&'a self, prefix: &'a [u8]) -> StoreFuture<'a, WatchStream> {
        Box::pin(async move {
            self.gate().await?;

            // Subscribe under the state lock so the feed starts exactly after
            // the current revision.
            let (mut events, mut disruptions) = {
                let _state = self.shared.state.lock();
                (self.shared.events.subscribe(), self.disruptions.subscribe())
            };
            let (feed, stream) = WatchStream::channel(self.watch_buffer);
            let prefix = prefix.to_vec();

            tokio::spawn(async move {
                loop {
                    tokio::select! {
                        _ = feed.cancelled() => break,
                        changed = disruptions.changed() => {
                            if changed.is_ok() {
                                feed.fail(StoreError::disrupted("embedded watch feed disrupted")).await;
                            }
                            break;
                        }
                        received = events.recv() => match received {
                            Ok(event) => {
                                if event.key.starts_with(&prefix) && !feed.send(Ok(event)).await {
                                    break;
                                }
                            }
                            Err(RecvError::Lagged(missed)) => {
                                feed.fail(StoreError::disrupted(format!(
                                    "watch subscriber lagged by {} events",
                                    missed
                                )))
                                .await;
                                break;
                            }
                            Err(RecvError::Closed) => {
                                feed.fail(StoreError::Closed).await;
                                break;
                            }
                        },
                    }
                }
            });

            Ok(stream)
        })
    }

    fn txn<'a>(&'a self, conditions: Vec<Condition>, ops: Vec<TxnOp>) -> StoreFuture<'a, bool> {
        Box::pin(async move {
            self.gate().await?;
            if self.journal.is_none() {
                return Ok(self.shared.commit_volatile(&conditions, &ops));
            }
            self.with_journal(move |shared, journal| {
                shared.commit_durable(journal, &conditions, &ops)
            })
            .await
        })
    }

    /// Compact the journal into a fresh snapshot.
    fn flush(&self) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            if self.journal.is_none() {
                return Ok(());
            }
            self.with_journal(|shared, journal| shared.compact(journal))
                .await
        })
    }

    fn name(&self) -> &'static str {
        "embedded"
    }
}
