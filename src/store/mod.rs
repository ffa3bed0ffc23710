//! Pool store boundary.
//!
//! The pool keeps its durable state in a key-value store offering prefix
//! reads, prefix watches, and all-or-nothing conditional transactions. Two
//! implementations ship: the embedded [`MemoryPoolStore`] and, behind the
//! `grpc` feature, an etcd v3 client.

pub mod journal;
pub mod memory;
pub mod state_machine;

#[cfg(feature = "grpc")]
pub mod etcd;

pub use memory::MemoryPoolStore;

#[cfg(feature = "grpc")]
pub use etcd::EtcdPoolStore;

use crate::core::error::{StoreError, StoreResult};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use tokio::sync::mpsc;

/// Boxed future returned by [`PoolStore`] methods.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = StoreResult<T>> + Send + 'a>>;

/// A key with its current value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyValue {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}

/// Kind of change carried by a watch event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Put,
    Delete,
}

/// A single change observed on a watched prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEvent {
    pub kind: EventKind,
    pub key: Vec<u8>,
    /// Store revision that produced the change.
    pub revision: u64,
}

impl WatchEvent {
    /// Create a Put event.
    pub fn put(key: impl Into<Vec<u8>>, revision: u64) -> Self {
        Self {
            kind: EventKind::Put,
            key: key.into(),
            revision,
        }
    }

    /// Create a Delete event.
    pub fn delete(key: impl Into<Vec<u8>>, revision: u64) -> Self {
        Self {
            kind: EventKind::Delete,
            key: key.into(),
            revision,
        }
    }
}

/// Transaction precondition. All conditions of a transaction must hold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Condition {
    Exists(Vec<u8>),
    Absent(Vec<u8>),
}

/// Mutation applied when a transaction's conditions hold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TxnOp {
    Put { key: Vec<u8>, value: Vec<u8> },
    Delete { key: Vec<u8> },
}

impl TxnOp {
    /// Create a Put op.
    pub fn put(key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Self {
        Self::Put {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Create a Delete op.
    pub fn delete(key: impl Into<Vec<u8>>) -> Self {
        Self::Delete { key: key.into() }
    }

    /// Key touched by this op.
    pub fn key(&self) -> &[u8] {
        match self {
            Self::Put { key, .. } | Self::Delete { key } => key,
        }
    }
}

/// Replicated key-value store consumed by the pool.
///
/// `txn` returns `Ok(false)` when a precondition did not hold and nothing was
/// applied; `Err` is reserved for transport or store failures.
pub trait PoolStore: Send + Sync {
    /// Snapshot read of every key under a prefix, in key order.
    fn list_prefix<'a>(&'a self, prefix: &'a [u8]) -> StoreFuture<'a, Vec<KeyValue>>;

    /// Read a single key.
    fn get<'a>(&'a self, key: &'a [u8]) -> StoreFuture<'a, Option<Vec<u8>>>;

    /// Subscribe to changes under a prefix, starting after the current revision.
    fn watch_prefix<'a>(&'a self, prefix: &'a [u8]) -> StoreFuture<'a, WatchStream>;

    /// Atomically check `conditions` and, only if all hold, apply `ops`.
    fn txn<'a>(&'a self, conditions: Vec<Condition>, ops: Vec<TxnOp>) -> StoreFuture<'a, bool>;

    /// Persist any buffered state. No-op for stores without local state.
    fn flush(&self) -> StoreFuture<'_, ()> {
        Box::pin(async { Ok(()) })
    }

    /// Short name for logs.
    fn name(&self) -> &'static str;
}

/// A cancellable watch subscription.
///
/// Events arrive in per-key order. An `Err` item means the feed is broken and
/// no further events will follow. Dropping the stream releases the
/// subscription.
#[derive(Debug)]
pub struct WatchStream {
    events: mpsc::Receiver<StoreResult<WatchEvent>>,
}

impl WatchStream {
    /// Create a stream and the producer half that feeds it.
    pub fn channel(capacity: usize) -> (WatchFeed, Self) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (WatchFeed { events: tx }, Self { events: rx })
    }

    /// Next event, or `None` once the feed has ended.
    pub async fn next(&mut self) -> Option<StoreResult<WatchEvent>> {
        self.events.recv().await
    }

    /// Release the subscription. Events not yet received are discarded.
    pub fn cancel(&mut self) {
        self.events.close();
    }
}

/// Producer half of a [`WatchStream`], held by the store's forwarding task.
#[derive(Debug, Clone)]
pub struct WatchFeed {
    events: mpsc::Sender<StoreResult<WatchEvent>>,
}

impl WatchFeed {
    /// Deliver an item. Returns false once the subscriber has gone away.
    pub async fn send(&self, item: StoreResult<WatchEvent>) -> bool {
        self.events.send(item).await.is_ok()
    }

    /// Report a broken feed to the subscriber.
    pub async fn fail(&self, err: StoreError) {
        let _ = self.events.send(Err(err)).await;
    }

    /// Resolves when the subscriber cancels or drops the stream.
    pub async fn cancelled(&self) {
        self.events.closed().await
    }

    /// Check if the subscriber has gone away.
    pub fn is_cancelled(&self) -> bool {
        self.events.is_closed()
    }
}

/// Smallest key greater than every key starting with `prefix`.
///
/// Returns `None` when no such key exists (prefix is empty or all `0xff`).
pub fn prefix_range_end(prefix: &[u8]) -> Option<Vec<u8>> {
    let mut end = prefix.to_vec();
    while let Some(last) = end.pop() {
        if last < u8::MAX {
            end.push(last + 1);
            return Some(end);
        }
    }
    None
}
