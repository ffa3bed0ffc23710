//! Revisioned key-value state machine backing the embedded store.
//!
//! Every committed transaction bumps the revision once and records one event
//! per mutated key. The whole state serializes to a bincode snapshot.

use super::{Condition, EventKind, KeyValue, TxnOp, WatchEvent};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A live key-value record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KvRecord {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
    /// Revision when this key was created.
    pub create_revision: u64,
    /// Revision of the last modification.
    pub mod_revision: u64,
    /// Number of puts since creation.
    pub version: u64,
}

/// Outcome of applying a transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxnOutcome {
    /// Conditions held; ops applied at `revision`.
    Committed { revision: u64, events: Vec<WatchEvent> },
    /// A condition failed; nothing changed.
    Rejected,
}

impl TxnOutcome {
    pub fn succeeded(&self) -> bool {
        matches!(self, Self::Committed { .. })
    }
}

/// In-memory key index with a monotonically increasing revision.
#[derive(Debug, Default)]
pub struct KvStateMachine {
    current_revision: u64,
    index: BTreeMap<Vec<u8>, KvRecord>,
}

impl KvStateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the current revision.
    pub fn current_revision(&self) -> u64 {
        self.current_revision
    }

    /// Get a key's current record.
    pub fn get(&self, key: &[u8]) -> Option<&KvRecord> {
        self.index.get(key)
    }

    /// Check if a key exists.
    pub fn contains(&self, key: &[u8]) -> bool {
        self.index.contains_key(key)
    }

    /// Number of live keys.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// All records whose key starts with `prefix`, in key order.
    pub fn range_prefix(&self, prefix: &[u8]) -> Vec<KeyValue> {
        self.index
            .range(prefix.to_vec()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, r)| KeyValue {
                key: k.clone(),
                value: r.value.clone(),
            })
            .collect()
    }

    /// Check every condition against current state.
    pub fn check(&self, conditions: &[Condition]) -> bool {
        conditions.iter().all(|c| match c {
            Condition::Exists(key) => self.contains(key),
            Condition::Absent(key) => !self.contains(key),
        })
    }

    /// Apply a conditional transaction.
    ///
    /// All ops of a committed transaction share one revision. Deleting a
    /// missing key is a no-op and produces no event.
    pub fn apply_txn(&mut self, conditions: &[Condition], ops: &[TxnOp]) -> TxnOutcome {
        if !self.check(conditions) {
            return TxnOutcome::Rejected;
        }

        let revision = self.current_revision + 1;
        let mut events = Vec::with_capacity(ops.len());
        for op in ops {
            match op {
                TxnOp::Put { key, value } => {
                    self.put(key.clone(), value.clone(), revision);
                    events.push(WatchEvent::put(key.clone(), revision));
                }
                TxnOp::Delete { key } => {
                    if self.index.remove(key).is_some() {
                        events.push(WatchEvent::delete(key.clone(), revision));
                    }
                }
            }
        }
        self.current_revision = revision;

        TxnOutcome::Committed { revision, events }
    }

    fn put(&mut self, key: Vec<u8>, value: Vec<u8>, revision: u64) {
        let (create_revision, version) = match self.index.get(&key) {
            Some(prev) => (prev.create_revision, prev.version + 1),
            None => (revision, 1),
        };
        self.index.insert(
            key.clone(),
            KvRecord {
                key,
                value,
                create_revision,
                mod_revision: revision,
                version,
            },
        );
    }

    /// Create a snapshot of the current state.
    pub fn snapshot(&self) -> KvSnapshot {
        KvSnapshot {
            revision: self.current_revision,
            records: self.index.values().cloned().collect(),
        }
    }

    /// Serialize the state machine to bytes.
    pub fn serialize(&self) -> Result<Vec<u8>, bincode::Error> {
        bincode::serialize(&self.snapshot())
    }

    /// Deserialize a state machine from bytes.
    pub fn deserialize(bytes: &[u8]) -> Result<Self, bincode::Error> {
        let snapshot: KvSnapshot = bincode::deserialize(bytes)?;
        Ok(snapshot.restore())
    }
}

/// Persistable image of a [`KvStateMachine`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KvSnapshot {
    pub revision: u64,
    pub records: Vec<KvRecord>,
}

impl KvSnapshot {
    /// Rebuild a state machine from this snapshot.
    pub fn restore(&self) -> KvStateMachine {
        let index = self
            .records
            .iter()
            .map(|r| (r.key.clone(), r.clone()))
            .collect();
        KvStateMachine {
            current_revision: self.revision,
            index,
        }
    }
}

/// Count events of each kind, for logs.
pub fn event_counts(events: &[WatchEvent]) -> (usize, usize) {
    events.iter().fold((0, 0), |(puts, deletes), e| match e.kind {
        EventKind::Put => (puts + 1, deletes),
        EventKind::Delete => (puts, deletes + 1),
    })
}
