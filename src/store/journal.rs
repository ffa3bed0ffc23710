//! Durable log for the embedded store.
//!
//! On disk the store is a snapshot (`pool.snapshot`), an append-only journal
//! (`pool.journal`) of transactions committed after it, and a lock file
//! (`pool.lock`) held exclusively for as long as the store is open.
//!
//! Each journal entry is a little-endian `u32` length followed by a bincode
//! [`JournalEntry`]. Recovery loads the snapshot and replays entries past its
//! revision. A torn final entry is cut off. Compaction writes a new snapshot
//! and truncates the journal, so a crash in between only leaves entries that
//! replay skips.

use super::state_machine::{KvSnapshot, KvStateMachine};
use super::TxnOp;
use crate::core::error::{StoreError, StoreResult};
use fs4::FileExt;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Default number of entries between compactions.
pub const DEFAULT_COMPACT_EVERY: u64 = 8_192;

const LEN_PREFIX: usize = 4;

/// One committed transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalEntry {
    /// Revision the transaction produced.
    pub revision: u64,
    pub ops: Vec<TxnOp>,
}

impl JournalEntry {
    fn encode(&self) -> StoreResult<Vec<u8>> {
        let body = bincode::serialize(self)
            .map_err(|e| StoreError::corrupt(format!("failed to encode journal entry: {}", e)))?;
        let len = u32::try_from(body.len())
            .map_err(|_| StoreError::corrupt("journal entry exceeds 4 GiB"))?;
        let mut frame = Vec::with_capacity(LEN_PREFIX + body.len());
        frame.extend_from_slice(&len.to_le_bytes());
        frame.extend_from_slice(&body);
        Ok(frame)
    }
}

/// Journal tuning.
#[derive(Debug, Clone, Copy)]
pub struct JournalOptions {
    /// fsync after every append.
    pub sync: bool,
    /// Entries between compactions.
    pub compact_every: u64,
}

impl Default for JournalOptions {
    fn default() -> Self {
        Self {
            sync: true,
            compact_every: DEFAULT_COMPACT_EVERY,
        }
    }
}

/// Open journal plus the lock that makes this process its only writer.
#[derive(Debug)]
pub struct Journal {
    snapshot_path: PathBuf,
    log_path: PathBuf,
    log: File,
    /// Length of the log up to the last complete entry.
    len: u64,
    entries: u64,
    options: JournalOptions,
    /// Set when a failed append could not be rolled back.
    poisoned: bool,
    _lock: File,
}

impl Journal {
    /// Lock the store at `snapshot_path`, then recover its state.
    ///
    /// Fails with `Unavailable` if another handle holds the lock.
    pub fn open(
        snapshot_path: impl Into<PathBuf>,
        options: JournalOptions,
    ) -> StoreResult<(Self, KvStateMachine)> {
        let snapshot_path = snapshot_path.into();
        let log_path = snapshot_path.with_extension("journal");
        let lock_path = snapshot_path.with_extension("lock");

        if let Some(parent) = snapshot_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| io_error("create", parent, e))?;
        }

        let lock = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)
            .map_err(|e| io_error("open", &lock_path, e))?;
        FileExt::try_lock_exclusive(&lock).map_err(|e| {
            StoreError::unavailable(format!(
                "embedded store {} is in use by another process: {}",
                snapshot_path.display(),
                e
            ))
        })?;

        let mut state = read_snapshot(&snapshot_path)?;
        let (len, entries) = replay(&log_path, &mut state)?;

        let log = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)
            .map_err(|e| io_error("open", &log_path, e))?;
        let on_disk = log
            .metadata()
            .map_err(|e| io_error("stat", &log_path, e))?
            .len();
        if on_disk > len {
            tracing::warn!(
                path = %log_path.display(),
                discarded = on_disk - len,
                "discarding torn journal tail"
            );
            log.set_len(len).map_err(|e| io_error("truncate", &log_path, e))?;
        }

        tracing::debug!(
            path = %log_path.display(),
            replayed = entries,
            revision = state.current_revision(),
            "journal recovered"
        );

        Ok((
            Self {
                snapshot_path,
                log_path,
                log,
                len,
                entries,
                options,
                poisoned: false,
                _lock: lock,
            },
            state,
        ))
    }

    /// Append one entry. The entry is durable on return when `sync` is set.
    pub fn append(&mut self, entry: &JournalEntry) -> StoreResult<()> {
        if self.poisoned {
            return Err(StoreError::unavailable(format!(
                "journal {} is unusable after a failed write",
                self.log_path.display()
            )));
        }

        let frame = entry.encode()?;
        let written = self.log.write_all(&frame).and_then(|_| {
            if self.options.sync {
                self.log.sync_data()
            } else {
                Ok(())
            }
        });

        if let Err(e) = written {
            // Drop any partial frame so later appends stay parseable.
            if self.log.set_len(self.len).is_err() {
                self.poisoned = true;
            }
            return Err(io_error("append to", &self.log_path, e));
        }

        self.len += frame.len() as u64;
        self.entries += 1;
        Ok(())
    }

    /// Entries since the last compaction.
    pub fn entries(&self) -> u64 {
        self.entries
    }

    pub fn needs_compaction(&self) -> bool {
        self.entries >= self.options.compact_every
    }

    /// Write `snapshot` and empty the journal.
    ///
    /// `snapshot` must cover every appended entry.
    pub fn compact(&mut self, snapshot: &KvSnapshot) -> StoreResult<()> {
        let bytes = bincode::serialize(snapshot)
            .map_err(|e| StoreError::corrupt(format!("failed to serialize snapshot: {}", e)))?;
        write_atomic(&self.snapshot_path, &bytes)?;

        self.log
            .set_len(0)
            .and_then(|_| self.log.sync_all())
            .map_err(|e| io_error("truncate", &self.log_path, e))?;
        self.len = 0;
        self.entries = 0;
        self.poisoned = false;

        tracing::debug!(
            path = %self.snapshot_path.display(),
            revision = snapshot.revision,
            keys = snapshot.records.len(),
            "embedded store compacted"
        );
        Ok(())
    }
}

fn read_snapshot(path: &Path) -> StoreResult<KvStateMachine> {
    match std::fs::read(path) {
        Ok(bytes) => KvStateMachine::deserialize(&bytes)
            .map_err(|e| StoreError::corrupt(format!("snapshot {}: {}", path.display(), e))),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(KvStateMachine::new()),
        Err(e) => Err(io_error("read", path, e)),
    }
}

/// Apply journal entries past the state's revision.
///
/// Returns the length of the valid prefix and the number of entries in it.
fn replay(path: &Path, state: &mut KvStateMachine) -> StoreResult<(u64, u64)> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok((0, 0)),
        Err(e) => return Err(io_error("read", path, e)),
    };

    let mut offset = 0usize;
    let mut entries = 0u64;
    while bytes.len() - offset >= LEN_PREFIX {
        let mut len_buf = [0u8; LEN_PREFIX];
        len_buf.copy_from_slice(&bytes[offset..offset + LEN_PREFIX]);
        let len = u32::from_le_bytes(len_buf) as usize;
        let start = offset + LEN_PREFIX;
        let Some(end) = start.checked_add(len).filter(|end| *end <= bytes.len()) else {
            break;
        };

        let entry: JournalEntry = match bincode::deserialize(&bytes[start..end]) {
            Ok(entry) => entry,
            // Only the final entry can be torn.
            Err(_) if end == bytes.len() => break,
            Err(e) => {
                return Err(StoreError::corrupt(format!(
                    "journal {} at offset {}: {}",
                    path.display(),
                    offset,
                    e
                )))
            }
        };

        let expected = state.current_revision() + 1;
        if entry.revision == expected {
            state.apply_txn(&[], &entry.ops);
        } else if entry.revision > expected {
            return Err(StoreError::corrupt(format!(
                "journal {} skips from revision {} to {}",
                path.display(),
                expected - 1,
                entry.revision
            )));
        }

        offset = end;
        entries += 1;
    }

    Ok((offset as u64, entries))
}

/// Temp file, fsync, rename.
fn write_atomic(path: &Path, bytes: &[u8]) -> StoreResult<()> {
    let tmp = path.with_extension("tmp");
    let write = || -> std::io::Result<()> {
        let mut file = File::create(&tmp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        std::fs::rename(&tmp, path)
    };
    write().map_err(|e| io_error("write", path, e))
}

fn io_error(action: &str, path: &Path, e: std::io::Error) -> StoreError {
    StoreError::unavailable(format!("failed to {} {}: {}", action, path.display(), e))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(revision: u64, key: &str) -> JournalEntry {
        JournalEntry {
            revision,
            ops: vec![TxnOp::put(key, "")],
        }
    }

    fn options(compact_every: u64) -> JournalOptions {
        JournalOptions {
            sync: false,
            compact_every,
        }
    }

    #[test]
    fn test_append_and_replay() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pool.snapshot");
        {
            let (mut journal, state) = Journal::open(&path, options(100)).unwrap();
            assert_eq!(state.current_revision(), 0);
            journal.append(&entry(1, "/p/a")).unwrap();
            journal.append(&entry(2, "/p/b")).unwrap();
            assert_eq!(journal.entries(), 2);
        }

        let (journal, state) = Journal::open(&path, options(100)).unwrap();
        assert_eq!(state.current_revision(), 2);
        assert!(state.contains(b"/p/b"));
        assert_eq!(journal.entries(), 2);
        assert!(!path.exists());
    }

    #[test]
    fn test_second_open_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pool.snapshot");
        let (held, _) = Journal::open(&path, options(100)).unwrap();

        let err = Journal::open(&path, options(100)).unwrap_err();
        assert!(matches!(err, StoreError::Unavailable { .. }));
        assert!(err.to_string().contains("in use"));

        drop(held);
        assert!(Journal::open(&path, options(100)).is_ok());
    }

    #[test]
    fn test_torn_tail_is_discarded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pool.snapshot");
        {
            let (mut journal, _) = Journal::open(&path, options(100)).unwrap();
            journal.append(&entry(1, "/p/a")).unwrap();
        }
        let log = path.with_extension("journal");
        let intact = std::fs::metadata(&log).unwrap().len();
        let mut file = OpenOptions::new().append(true).open(&log).unwrap();
        file.write_all(&[200, 0, 0, 0, 1, 2]).unwrap();
        drop(file);

        {
            let (mut journal, state) = Journal::open(&path, options(100)).unwrap();
            assert_eq!(state.current_revision(), 1);
            assert_eq!(std::fs::metadata(&log).unwrap().len(), intact);
            journal.append(&entry(2, "/p/b")).unwrap();
        }

        let (_, state) = Journal::open(&path, options(100)).unwrap();
        assert_eq!(state.current_revision(), 2);
    }

    #[test]
    fn test_compaction_truncates_log() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pool.snapshot");
        {
            let (mut journal, mut state) = Journal::open(&path, options(2)).unwrap();
            for (revision, key) in [(1, "/p/a"), (2, "/p/b")] {
                let e = entry(revision, key);
                journal.append(&e).unwrap();
                state.apply_txn(&[], &e.ops);
            }
            assert!(journal.needs_compaction());
            journal.compact(&state.snapshot()).unwrap();
            assert_eq!(journal.entries(), 0);
            assert_eq!(std::fs::metadata(path.with_extension("journal")).unwrap().len(), 0);

            journal.append(&entry(3, "/p/c")).unwrap();
        }

        let (journal, state) = Journal::open(&path, options(2)).unwrap();
        assert_eq!(state.current_revision(), 3);
        assert_eq!(state.len(), 3);
        assert_eq!(journal.entries(), 1);
    }

    #[test]
    fn test_entries_covered_by_snapshot_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pool.snapshot");
        let mut state = KvStateMachine::new();
        let first = entry(1, "/p/a");
        state.apply_txn(&[], &first.ops);
        write_atomic(&path, &state.serialize().unwrap()).unwrap();

        // Crash between snapshot rename and journal truncation.
        let mut log = File::create(path.with_extension("journal")).unwrap();
        log.write_all(&first.encode().unwrap()).unwrap();
        log.write_all(&entry(2, "/p/b").encode().unwrap()).unwrap();
        drop(log);

        let (_, state) = Journal::open(&path, options(100)).unwrap();
        assert_eq!(state.current_revision(), 2);
        assert_eq!(state.len(), 2);
    }

    #[test]
    fn test_revision_gap_is_corruption() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pool.snapshot");
        let mut log = File::create(path.with_extension("journal")).unwrap();
        log.write_all(&entry(3, "/p/a").encode().unwrap()).unwrap();
        drop(log);

        let err = Journal::open(&path, options(100)).unwrap_err();
        assert!(matches!(err, StoreError::Corrupt { .. }));
    }
}
