//! Bufferer - disk-backed overflow queue
//!
//! Absorbs batches while a downstream is unavailable, persists them, and
//! re-offers them FIFO once the downstream recovers. Survives a process
//! restart through an index file written on clean shutdown.
//!
//! # Layout
//!
//! One directory per endpoint. Each buffered batch is one payload file -
//! a JSON envelope `{database, retention_policy, precision, points}` with
//! `points` holding the batch's line-protocol text. Between a clean
//! shutdown and the next init the directory also holds `index.json`, the
//! serialized FIFO order; init loads it and deletes it.
//!
//! # Flow
//!
//! ```text
//! Endpoint::post --try_send--> [input queue] --Flush (coalesce)--> disk
//! disk --Pop--> Endpoint::post (paced by the backlog drainer)
//! ```
//!
//! The input queue is bounded; a full queue fails the enqueue immediately
//! with [`BackendError::Overloaded`] rather than blocking the caller.

use std::collections::VecDeque;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sir_protocol::{Batch, FieldValue, Point};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::{BackendError, Result};

/// Capacity of the in-memory input queue
pub const INPUT_QUEUE_CAPACITY: usize = 10_000;

/// Telemetry measurement emitted by [`Bufferer::stats`]
pub const BUFFER_MEASUREMENT: &str = "sir_relaybuffer";

const INDEX_FILE: &str = "index.json";
const WRITE_PROBE_FILE: &str = ".sir_write_probe";

/// Metadata for one persisted batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BufferFile {
    /// Opaque unique payload file name
    pub filename: String,
    /// Point count of the persisted batch
    pub num_metrics: usize,
    /// Coalescing key: database
    pub database: String,
    /// Coalescing key: retention policy
    pub retention_policy: String,
    /// Coalescing key: precision
    pub precision: String,
}

impl BufferFile {
    fn for_batch(batch: &Batch) -> Self {
        Self {
            // v7 ids sort by creation order without depending on the
            // wall clock for uniqueness.
            filename: Uuid::now_v7().to_string(),
            num_metrics: batch.num_points(),
            database: batch.database().to_string(),
            retention_policy: batch.retention_policy().to_string(),
            precision: batch.precision().to_string(),
        }
    }
}

/// On-disk payload envelope
#[derive(Debug, Serialize, Deserialize)]
struct BatchEnvelope {
    database: String,
    retention_policy: String,
    precision: String,
    points: String,
}

impl BatchEnvelope {
    fn from_batch(batch: &Batch) -> Self {
        Self {
            database: batch.database().to_string(),
            retention_policy: batch.retention_policy().to_string(),
            precision: batch.precision().to_string(),
            points: batch.to_line_protocol(),
        }
    }
}

/// Serialized form of the index, as written to `index.json`
#[derive(Debug, Serialize, Deserialize)]
struct IndexSnapshot {
    bufferfiles: VecDeque<BufferFile>,
}

/// Durable per-endpoint FIFO overflow queue
pub struct Bufferer {
    root: PathBuf,
    flush_frequency: Duration,
    input_tx: mpsc::Sender<Batch>,
    input_rx: Mutex<mpsc::Receiver<Batch>>,
    /// FIFO state; index order is retrieval order. Index and payload
    /// files are only touched while this lock is held.
    index: Mutex<VecDeque<BufferFile>>,
}

impl Bufferer {
    /// Create a bufferer rooted at `root` with the default input capacity
    pub fn new(root: impl Into<PathBuf>, flush_frequency: Duration) -> Self {
        Self::with_capacity(root, flush_frequency, INPUT_QUEUE_CAPACITY)
    }

    /// Create a bufferer with an explicit input queue capacity
    pub fn with_capacity(
        root: impl Into<PathBuf>,
        flush_frequency: Duration,
        capacity: usize,
    ) -> Self {
        let (input_tx, input_rx) = mpsc::channel(capacity);
        Self {
            root: root.into(),
            flush_frequency,
            input_tx,
            input_rx: Mutex::new(input_rx),
            index: Mutex::new(VecDeque::new()),
        }
    }

    /// Root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Number of persisted batches
    pub fn len(&self) -> usize {
        self.index.lock().len()
    }

    /// True when nothing is persisted
    pub fn is_empty(&self) -> bool {
        self.index.lock().is_empty()
    }

    /// Snapshot of the index entries, oldest first
    pub fn index(&self) -> Vec<BufferFile> {
        self.index.lock().iter().cloned().collect()
    }

    /// Prepare the root directory and recover any saved index
    ///
    /// Creates the directory if absent and verifies write access with a
    /// probe file. An existing `index.json` is loaded into the in-memory
    /// index and then deleted from disk.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::Io`] when the directory is unwritable, or
    /// [`BackendError::Corrupt`] when a saved index does not parse.
    pub fn init(&self) -> Result<()> {
        fs::create_dir_all(&self.root)?;

        let probe = self.root.join(WRITE_PROBE_FILE);
        fs::write(&probe, b" ")?;
        fs::remove_file(&probe)?;

        self.load_index()
    }

    fn load_index(&self) -> Result<()> {
        let path = self.root.join(INDEX_FILE);
        let data = match fs::read(&path) {
            Ok(data) => data,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        let snapshot: IndexSnapshot =
            serde_json::from_slice(&data).map_err(|e| BackendError::Corrupt {
                filename: INDEX_FILE.to_string(),
                reason: e.to_string(),
            })?;

        tracing::info!(
            root = %self.root.display(),
            files = snapshot.bufferfiles.len(),
            "recovered buffer index"
        );
        *self.index.lock() = snapshot.bufferfiles;
        fs::remove_file(&path)?;
        Ok(())
    }

    /// Queue a batch for the next flush
    ///
    /// Never blocks: a full input queue fails with
    /// [`BackendError::Overloaded`] and the batch is dropped.
    pub fn enqueue(&self, batch: Batch) -> Result<()> {
        self.input_tx
            .try_send(batch)
            .map_err(|_| BackendError::Overloaded)
    }

    /// Persist one batch at the tail of the queue
    ///
    /// The payload file is written fully before the index entry is
    /// appended; a failed write leaves no index entry behind.
    pub fn write(&self, batch: &Batch) -> Result<()> {
        let mut index = self.index.lock();

        let entry = BufferFile::for_batch(batch);
        let payload = serde_json::to_vec(&BatchEnvelope::from_batch(batch)).map_err(io::Error::from)?;

        let path = self.root.join(&entry.filename);
        if let Err(e) = fs::write(&path, &payload) {
            let _ = fs::remove_file(&path);
            return Err(e.into());
        }

        index.push_back(entry);
        Ok(())
    }

    /// Drain the input queue to disk
    ///
    /// Received batches are grouped by coalescing key - groups ordered by
    /// first arrival, points concatenated in arrival order - and each
    /// group is written as one batch.
    pub fn flush(&self) -> Result<()> {
        let mut groups: Vec<Batch> = Vec::new();
        {
            let mut input = self.input_rx.lock();
            while let Ok(batch) = input.try_recv() {
                match groups.iter_mut().find(|group| group.can_coalesce(&batch)) {
                    Some(group) => group.merge(batch),
                    None => groups.push(batch),
                }
            }
        }

        for batch in &groups {
            self.write(batch)?;
        }
        Ok(())
    }

    /// Take the oldest batch off the queue
    ///
    /// Returns `Ok(None)` when the index is empty. The head entry and its
    /// payload file are removed even when the payload turns out corrupt -
    /// a bad entry must not wedge the queue - in which case
    /// [`BackendError::Corrupt`] is returned.
    pub fn pop(&self) -> Result<Option<Batch>> {
        let mut index = self.index.lock();
        let Some(head) = index.pop_front() else {
            return Ok(None);
        };

        let path = self.root.join(&head.filename);
        let restored = read_payload(&path);
        let removed = fs::remove_file(&path);

        match restored {
            Ok(batch) => {
                removed?;
                Ok(Some(batch))
            }
            Err(reason) => Err(BackendError::Corrupt {
                filename: head.filename,
                reason,
            }),
        }
    }

    /// Serialize the current index to `index.json`
    pub fn save_index(&self) -> Result<()> {
        let snapshot = IndexSnapshot {
            bufferfiles: self.index.lock().clone(),
        };
        let payload = serde_json::to_vec(&snapshot).map_err(io::Error::from)?;
        fs::write(self.root.join(INDEX_FILE), payload)?;
        Ok(())
    }

    /// Flush loop
    ///
    /// Flushes the input queue every `flush_frequency` while it is
    /// non-empty. On cancellation performs a final flush, saves the index
    /// and returns. Only I/O errors terminate the loop early.
    pub async fn run(&self, shutdown: CancellationToken) -> Result<()> {
        let mut ticker = tokio::time::interval(self.flush_frequency);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::debug!(root = %self.root.display(), "bufferer shutting down");
                    self.flush()?;
                    self.save_index()?;
                    return Ok(());
                }
                _ = ticker.tick() => {
                    if !self.input_rx.lock().is_empty() {
                        self.flush()?;
                    }
                }
            }
        }
    }

    /// One `sir_relaybuffer` telemetry point: persisted file count and
    /// total buffered metrics, snapshotted under the lock
    pub fn stats(&self) -> Point {
        let index = self.index.lock();
        let num_metrics: usize = index.iter().map(|entry| entry.num_metrics).sum();
        Point::new(BUFFER_MEASUREMENT)
            .with_field("files", FieldValue::Integer(index.len() as i64))
            .with_field("num_metrics", FieldValue::Integer(num_metrics as i64))
    }
}

fn read_payload(path: &Path) -> std::result::Result<Batch, String> {
    let data = fs::read(path).map_err(|e| e.to_string())?;
    let envelope: BatchEnvelope = serde_json::from_slice(&data).map_err(|e| e.to_string())?;
    Batch::parse_lines(
        envelope.database,
        envelope.retention_policy,
        envelope.precision,
        &envelope.points,
    )
    .map_err(|e| e.to_string())
}

#[cfg(test)]
#[path = "bufferer_test.rs"]
mod bufferer_test;
