//! Allocate/release entry point.
//!
//! Allocation pops the lowest cached address and claims it with a conditional
//! transaction. What happens to the popped address on failure depends only on
//! the error kind (see [`PoolError::requeues_popped_address`]): transient
//! failures put it back, a failed precondition drops it because the address
//! is already gone from availability.
//!
//! Release never touches the heap. The address becomes allocatable again once
//! the watcher observes the resulting Put.

use super::address::Address;
use super::heap::AvailabilityHeap;
use super::keys::PoolKeys;
use crate::core::error::{PoolError, PoolResult, StoreResult};
use crate::ops::observability::PoolMetrics;
use crate::store::{Condition, PoolStore, TxnOp};
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;

/// Default per-operation deadline.
pub const DEFAULT_OP_TIMEOUT: Duration = Duration::from_secs(3);

/// Deadline and cancellation for one store round trip.
#[derive(Debug, Clone)]
pub struct OpContext {
    pub timeout: Duration,
    /// Cancels the operation when the channel turns true.
    pub cancel: Option<watch::Receiver<bool>>,
}

impl OpContext {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout,
            cancel: None,
        }
    }

    /// Attach a cancellation signal.
    pub fn with_cancel(mut self, cancel: watch::Receiver<bool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Drive a store call under this context.
    ///
    /// Deadline expiry maps to `StoreUnavailable`, cancellation to `Cancelled`.
    pub async fn run<T, F>(&self, op: &'static str, fut: F) -> PoolResult<T>
    where
        F: Future<Output = StoreResult<T>>,
    {
        let mut cancel = self.cancel.clone();
        let cancelled = async {
            match cancel.as_mut() {
                Some(rx) => loop {
                    if *rx.borrow_and_update() {
                        return;
                    }
                    if rx.changed().await.is_err() {
                        // Sender gone: can no longer be cancelled.
                        std::future::pending::<()>().await;
                    }
                },
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            _ = cancelled => Err(PoolError::Cancelled),
            result = tokio::time::timeout(self.timeout, fut) => match result {
                Ok(result) => result.map_err(PoolError::from),
                Err(_) => Err(PoolError::store_unavailable(format!(
                    "{} exceeded deadline of {:?}",
                    op, self.timeout
                ))),
            },
        }
    }
}

impl Default for OpContext {
    fn default() -> Self {
        Self::with_timeout(DEFAULT_OP_TIMEOUT)
    }
}

/// Record counts in the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PoolUsage {
    pub available: usize,
    pub taken: usize,
}

/// Coordinates allocations between the heap and the store.
pub struct AllocationCoordinator {
    store: Arc<dyn PoolStore>,
    heap: Arc<AvailabilityHeap>,
    keys: PoolKeys,
    metrics: Arc<PoolMetrics>,
}

impl AllocationCoordinator {
    pub fn new(store: Arc<dyn PoolStore>, heap: Arc<AvailabilityHeap>, keys: PoolKeys) -> Self {
        Self {
            store,
            heap,
            keys,
            metrics: Arc::new(PoolMetrics::new()),
        }
    }

    /// Report through a shared metrics collector.
    pub fn with_metrics(mut self, metrics: Arc<PoolMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn heap(&self) -> &Arc<AvailabilityHeap> {
        &self.heap
    }

    pub fn keys(&self) -> &PoolKeys {
        &self.keys
    }

    /// Allocate the lowest available address to `owner`.
    pub async fn allocate(&self, owner: &str, ctx: &OpContext) -> PoolResult<Address> {
        if owner.trim().is_empty() {
            return Err(PoolError::InvalidOwner);
        }

        let Some(addr) = self.heap.pop() else {
            self.metrics.record_exhausted();
            tracing::warn!(owner, "address pool exhausted");
            return Err(PoolError::PoolExhausted);
        };
        self.metrics.set_heap_size(self.heap.len());

        let available = self.keys.available(&addr);
        let taken = self.keys.taken(&addr);
        let started = Instant::now();
        let result = ctx
            .run(
                "allocate",
                self.store.txn(
                    vec![Condition::Exists(available.clone())],
                    vec![TxnOp::delete(available), TxnOp::put(taken, owner)],
                ),
            )
            .await;

        match result {
            Ok(true) => {
                self.metrics
                    .record_allocation(started.elapsed().as_secs_f64() * 1000.0);
                tracing::info!(address = %addr, owner, "address allocated");
                Ok(addr)
            }
            Ok(false) => {
                self.metrics.record_conflict();
                tracing::warn!(address = %addr, owner, "allocation lost race, address dropped from cache");
                Err(PoolError::AllocationConflict {
                    address: addr.to_string(),
                })
            }
            Err(err) => {
                if err.requeues_popped_address() {
                    self.heap.push(addr);
                    self.metrics.set_heap_size(self.heap.len());
                }
                self.metrics.record_store_error(err.kind());
                tracing::warn!(address = %addr, owner, error = %err, "allocation failed");
                Err(err)
            }
        }
    }

    /// Return `addr` to the pool.
    ///
    /// Fails with `NotAllocated` if the address has no TakenRecord.
    pub async fn release(&self, addr: Address, ctx: &OpContext) -> PoolResult<()> {
        let available = self.keys.available(&addr);
        let taken = self.keys.taken(&addr);
        let result = ctx
            .run(
                "release",
                self.store.txn(
                    vec![Condition::Exists(taken.clone())],
                    vec![TxnOp::delete(taken), TxnOp::put(available, "")],
                ),
            )
            .await;

        match result {
            Ok(true) => {
                self.metrics.record_release();
                tracing::info!(address = %addr, "address released");
                Ok(())
            }
            Ok(false) => Err(PoolError::NotAllocated {
                address: addr.to_string(),
            }),
            Err(err) => {
                self.metrics.record_store_error(err.kind());
                tracing::warn!(address = %addr, error = %err, "release failed");
                Err(err)
            }
        }
    }

    /// Owner recorded for a taken address.
    pub async fn owner_of(&self, addr: Address, ctx: &OpContext) -> PoolResult<Option<String>> {
        let key = self.keys.taken(&addr);
        let value = ctx.run("owner_of", self.store.get(&key)).await?;
        Ok(value.map(|v| String::from_utf8_lossy(&v).into_owned()))
    }

    /// Count available and taken records in the store.
    pub async fn usage(&self, ctx: &OpContext) -> PoolResult<PoolUsage> {
        let available = ctx
            .run("usage", self.store.list_prefix(self.keys.available_prefix()))
            .await?;
        let taken = ctx
            .run("usage", self.store.list_prefix(self.keys.taken_prefix()))
            .await?;
        Ok(PoolUsage {
            available: available.len(),
            taken: taken.len(),
        })
    }
}

impl std::fmt::Debug for AllocationCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AllocationCoordinator")
            .field("store", &self.store.name())
            .field("heap_size", &self.heap.len())
            .field("keys", &self.keys)
            .finish()
    }
}
