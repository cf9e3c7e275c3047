//! File-backed queue store using an append-only journal.

use crate::error::{StoreError, StoreResult};
use crate::store::QueueStore;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tidemark_protocol::{insert_by_priority, SyncOperation};

/// One line of the journal.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum JournalRecord {
    Enqueue {
        operation: SyncOperation,
    },
    Remove {
        id: String,
    },
    Retry {
        id: String,
        retries: u32,
        error: String,
    },
}

#[derive(Debug)]
struct Journal {
    file: File,
    operations: Vec<SyncOperation>,
    records: usize,
}

impl Journal {
    fn append(&mut self, record: &JournalRecord) -> StoreResult<()> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');
        self.file.write_all(&line)?;
        self.file.flush()?;
        self.records += 1;
        Ok(())
    }

    fn apply(&mut self, record: JournalRecord) {
        apply_record(&mut self.operations, record);
    }
}

fn apply_record(operations: &mut Vec<SyncOperation>, record: JournalRecord) {
    match record {
        JournalRecord::Enqueue { operation } => {
            operations.retain(|op| op.id() != operation.id());
            insert_by_priority(operations, operation);
        }
        JournalRecord::Remove { id } => {
            operations.retain(|op| op.id() != id);
        }
        JournalRecord::Retry { id, retries, error } => {
            if let Some(op) = operations.iter_mut().find(|op| op.id() == id) {
                op.advance_retries(retries, error);
            }
        }
    }
}

/// Read-only view of a journal, produced by [`FileQueueStore::scan`].
#[derive(Debug, Clone)]
pub struct JournalScan {
    /// Pending operations in processing order.
    pub operations: Vec<SyncOperation>,
    /// Decodable records, live or not.
    pub records: usize,
    /// True if the journal ends in a record that could not be decoded.
    pub torn_tail: bool,
}

struct Replay {
    operations: Vec<SyncOperation>,
    records: usize,
    valid_len: usize,
}

impl Replay {
    // Works on bytes: a tail torn inside a multi-byte character is still
    // just a torn tail.
    fn run(path: &Path, contents: &[u8]) -> StoreResult<Self> {
        let mut operations = Vec::new();
        let mut records = 0usize;
        let mut valid_len = 0usize;
        let line_count = contents.split_inclusive(|b| *b == b'\n').count();

        for (index, line) in contents.split_inclusive(|b| *b == b'\n').enumerate() {
            let trimmed = line.trim_ascii();
            if trimmed.is_empty() {
                valid_len += line.len();
                continue;
            }

            match serde_json::from_slice::<JournalRecord>(trimmed) {
                Ok(record) => {
                    apply_record(&mut operations, record);
                    records += 1;
                    valid_len += line.len();
                }
                Err(e) if index + 1 == line_count => {
                    tracing::warn!(
                        path = %path.display(),
                        line = index + 1,
                        error = %e,
                        "dropping torn journal tail"
                    );
                    break;
                }
                Err(e) => {
                    return Err(StoreError::Corrupted {
                        line: index + 1,
                        reason: e.to_string(),
                    });
                }
            }
        }

        Ok(Self {
            operations,
            records,
            valid_len,
        })
    }
}

/// A file-backed queue store.
///
/// Every mutation is appended to a JSON-lines journal and the current queue
/// is rebuilt by replaying it on open. Payload bytes are stored as base64.
///
/// # Durability
///
/// - each record is flushed to the OS as it is written
/// - [`FileQueueStore::sync`] calls `File::sync_all()` to ensure data is on disk
/// - a torn final line (crash mid-write) is dropped on open; damage earlier
///   in the journal is reported as [`StoreError::Corrupted`]
/// - [`FileQueueStore::compact`] rewrites the journal with only live operations
///
/// # Example
///
/// ```no_run
/// use tidemark_protocol::{OperationType, SyncOperation};
/// use tidemark_storage::{FileQueueStore, QueueStore};
/// use std::path::Path;
///
/// let store = FileQueueStore::open(Path::new("queue.jsonl")).unwrap();
/// let op = SyncOperation::new(OperationType::Create, "emissions", b"{}".to_vec())
///     .with_id("op-1");
/// store.enqueue(&op).unwrap();
/// store.sync().unwrap();
/// ```
#[derive(Debug)]
pub struct FileQueueStore {
    path: PathBuf,
    journal: RwLock<Journal>,
}

impl FileQueueStore {
    /// Opens or creates a journal at the given path and replays it.
    ///
    /// A torn final record is cut off, and the journal is left ending in a
    /// newline so the next append starts a fresh line.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or a record before the
    /// final line cannot be decoded.
    pub fn open(path: &Path) -> StoreResult<Self> {
        let mut file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(path)?;

        let mut contents = Vec::new();
        file.read_to_end(&mut contents)?;
        let replay = Replay::run(path, &contents)?;

        if replay.valid_len < contents.len() {
            file.set_len(replay.valid_len as u64)?;
        }
        if replay.valid_len > 0 && contents[replay.valid_len - 1] != b'\n' {
            file.write_all(b"\n")?;
            file.flush()?;
        }

        tracing::debug!(
            path = %path.display(),
            records = replay.records,
            pending = replay.operations.len(),
            "queue journal opened"
        );

        Ok(Self {
            path: path.to_path_buf(),
            journal: RwLock::new(Journal {
                file,
                operations: replay.operations,
                records: replay.records,
            }),
        })
    }

    /// Replays a journal without modifying it.
    ///
    /// Unlike [`FileQueueStore::open`], a torn tail is only reported.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or a record before the
    /// final line cannot be decoded.
    pub fn scan(path: &Path) -> StoreResult<JournalScan> {
        let contents = fs::read(path)?;
        let replay = Replay::run(path, &contents)?;
        Ok(JournalScan {
            records: replay.records,
            torn_tail: replay.valid_len < contents.len(),
            operations: replay.operations,
        })
    }

    /// Opens or creates a journal, creating parent directories if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if directories cannot be created or the journal cannot be opened.
    pub fn open_with_create_dirs(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        Self::open(path)
    }

    /// Returns the path to the journal file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the number of records in the journal, live or not.
    #[must_use]
    pub fn record_count(&self) -> usize {
        self.journal.read().records
    }

    /// Returns the number of pending operations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.journal.read().operations.len()
    }

    /// Returns true if no operations are pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.journal.read().operations.is_empty()
    }

    /// Syncs the journal to durable storage.
    ///
    /// # Errors
    ///
    /// Returns an error if the sync fails.
    pub fn sync(&self) -> StoreResult<()> {
        self.journal.read().file.sync_all()?;
        Ok(())
    }

    /// Rewrites the journal so it holds one record per pending operation.
    ///
    /// Returns the number of records dropped.
    ///
    /// # Errors
    ///
    /// Returns an error if the new journal cannot be written or swapped in.
    pub fn compact(&self) -> StoreResult<usize> {
        let mut journal = self.journal.write();
        let before = journal.records;

        let tmp_path = self.path.with_extension("compact");
        {
            let mut tmp = File::create(&tmp_path)?;
            for operation in &journal.operations {
                let record = JournalRecord::Enqueue {
                    operation: operation.clone(),
                };
                let mut line = serde_json::to_vec(&record)?;
                line.push(b'\n');
                tmp.write_all(&line)?;
            }
            tmp.sync_all()?;
        }
        fs::rename(&tmp_path, &self.path)?;

        journal.file = OpenOptions::new()
            .read(true)
            .append(true)
            .open(&self.path)?;
        journal.records = journal.operations.len();

        let dropped = before.saturating_sub(journal.records);
        tracing::info!(path = %self.path.display(), dropped, "queue journal compacted");
        Ok(dropped)
    }
}

impl QueueStore for FileQueueStore {
    fn enqueue(&self, op: &SyncOperation) -> StoreResult<()> {
        let mut journal = self.journal.write();
        let record = JournalRecord::Enqueue {
            operation: op.clone(),
        };
        journal.append(&record)?;
        journal.apply(record);
        Ok(())
    }

    fn dequeue(&self) -> StoreResult<Option<SyncOperation>> {
        let mut journal = self.journal.write();
        let Some(id) = journal.operations.first().map(|op| op.id().to_string()) else {
            return Ok(None);
        };
        journal.append(&JournalRecord::Remove { id })?;
        Ok(Some(journal.operations.remove(0)))
    }

    fn peek(&self) -> StoreResult<Option<SyncOperation>> {
        Ok(self.journal.read().operations.first().cloned())
    }

    fn get_all(&self) -> StoreResult<Vec<SyncOperation>> {
        Ok(self.journal.read().operations.clone())
    }

    fn remove(&self, id: &str) -> StoreResult<()> {
        let mut journal = self.journal.write();
        if !journal.operations.iter().any(|op| op.id() == id) {
            return Ok(());
        }
        let record = JournalRecord::Remove { id: id.to_string() };
        journal.append(&record)?;
        journal.apply(record);
        Ok(())
    }

    fn update_retry(&self, id: &str, retries: u32, error: &str) -> StoreResult<()> {
        let mut journal = self.journal.write();
        if !journal.operations.iter().any(|op| op.id() == id) {
            return Err(StoreError::NotFound(id.to_string()));
        }
        let record = JournalRecord::Retry {
            id: id.to_string(),
            retries,
            error: error.to_string(),
        };
        journal.append(&record)?;
        journal.apply(record);
        Ok(())
    }
}
