//! In-memory store with snapshot reads and an optional write-ahead journal.
//!
//! Committed state is an immutable snapshot behind an `Arc`. Read-only
//! transactions clone the `Arc` and never wait. Read-write transactions
//! serialize on a single async writer lock, copy the snapshot on their first
//! mutation, and publish the copy on commit.
//!
//! With a journal, each commit appends one JSON line describing its
//! operations and fsyncs it before the new snapshot becomes visible. Opening
//! a journal replays it and compacts it down to a single snapshot line.
//! A journaled store holds an exclusive lock on `<journal>.lock` for as long
//! as it lives, so a second process cannot open the same journal.

use std::collections::{HashMap, VecDeque};
use std::fs::TryLockError;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{debug, info, warn};

use super::{DurableStore, Transaction, TxMode};
use crate::error::{Error, Result};
use crate::model::QueueName;

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct StoreState {
    topics: VecDeque<String>,
    tweets: VecDeque<String>,
    dead_topics: VecDeque<String>,
    dead_tweets: VecDeque<String>,
    scores: HashMap<String, f64>,
}

impl StoreState {
    fn queue(&self, queue: QueueName) -> &VecDeque<String> {
        match queue {
            QueueName::Topics => &self.topics,
            QueueName::Tweets => &self.tweets,
            QueueName::DeadTopics => &self.dead_topics,
            QueueName::DeadTweets => &self.dead_tweets,
        }
    }

    fn queue_mut(&mut self, queue: QueueName) -> &mut VecDeque<String> {
        match queue {
            QueueName::Topics => &mut self.topics,
            QueueName::Tweets => &mut self.tweets,
            QueueName::DeadTopics => &mut self.dead_topics,
            QueueName::DeadTweets => &mut self.dead_tweets,
        }
    }

    fn apply(&mut self, op: &Op) {
        match op {
            Op::Enqueue { queue, item } => self.queue_mut(*queue).push_back(item.clone()),
            Op::Dequeue { queue } => {
                self.queue_mut(*queue).pop_front();
            }
            Op::Drain { queue } => self.queue_mut(*queue).clear(),
            Op::Put { key, value } => {
                self.scores.insert(key.clone(), *value);
            }
            Op::Delete { key } => {
                self.scores.remove(key);
            }
            Op::Clear => self.scores.clear(),
        }
    }
}

/// A single mutation, as recorded in the journal.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum Op {
    Enqueue { queue: QueueName, item: String },
    Dequeue { queue: QueueName },
    Drain { queue: QueueName },
    Put { key: String, value: f64 },
    Delete { key: String },
    Clear,
}

/// One journal line.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum Record {
    Snapshot { state: StoreState },
    Commit { ops: Vec<Op> },
}

// ---------------------------------------------------------------------------
// Journal
// ---------------------------------------------------------------------------

struct Journal {
    path: PathBuf,
    file: tokio::fs::File,
    /// Length of the last fully written record boundary.
    len: u64,
    /// Released when the journal is dropped.
    _lock: std::fs::File,
}

/// Take the exclusive lock guarding `path`.
///
/// The lock lives on a sidecar file because compaction replaces the journal
/// itself with a new inode.
fn lock_journal(path: &Path) -> Result<std::fs::File> {
    let mut lock_path = path.as_os_str().to_owned();
    lock_path.push(".lock");
    let lock_path = PathBuf::from(lock_path);

    let file = std::fs::OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(&lock_path)?;
    match file.try_lock() {
        Ok(()) => Ok(file),
        Err(TryLockError::WouldBlock) => Err(Error::JournalLocked(path.to_path_buf())),
        Err(TryLockError::Error(e)) => Err(e.into()),
    }
}

impl Journal {
    /// Lock `path`, replay it (if it exists), compact it to one snapshot
    /// line, and reopen it for appending.
    async fn open(path: &Path) -> Result<(Self, StoreState)> {
        let lock = lock_journal(path)?;
        let state = replay(path).await?;

        let mut line = serde_json::to_vec(&Record::Snapshot {
            state: state.clone(),
        })?;
        line.push(b'\n');

        let tmp = path.with_extension("compact");
        {
            let mut file = tokio::fs::File::create(&tmp).await?;
            file.write_all(&line).await?;
            file.sync_all().await?;
        }
        tokio::fs::rename(&tmp, path).await?;

        let file = tokio::fs::OpenOptions::new()
            .append(true)
            .open(path)
            .await?;

        info!(
            path = %path.display(),
            tweets = state.tweets.len(),
            scores = state.scores.len(),
            "journal replayed"
        );

        Ok((
            Self {
                path: path.to_path_buf(),
                file,
                len: line.len() as u64,
                _lock: lock,
            },
            state,
        ))
    }

    /// Append one committed transaction and fsync it.
    async fn append(&mut self, ops: &[Op]) -> Result<()> {
        let mut line = serde_json::to_vec(&Record::Commit {
            ops: ops.to_vec(),
        })?;
        line.push(b'\n');

        let written = async {
            self.file.write_all(&line).await?;
            self.file.sync_data().await
        }
        .await;

        match written {
            Ok(()) => {
                self.len += line.len() as u64;
                Ok(())
            }
            Err(e) => {
                // Cut any partial line so the next append starts on a record boundary.
                if let Err(trunc) = self.file.set_len(self.len).await {
                    warn!(path = %self.path.display(), "journal truncate failed: {trunc}");
                }
                Err(e.into())
            }
        }
    }
}

async fn replay(path: &Path) -> Result<StoreState> {
    let contents = match tokio::fs::read_to_string(path).await {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(StoreState::default()),
        Err(e) => return Err(e.into()),
    };

    let lines: Vec<&str> = contents
        .lines()
        .filter(|line| !line.trim().is_empty())
        .collect();
    let mut state = StoreState::default();

    for (i, line) in lines.iter().enumerate() {
        match serde_json::from_str::<Record>(line) {
            Ok(Record::Snapshot { state: snapshot }) => state = snapshot,
            Ok(Record::Commit { ops }) => ops.iter().for_each(|op| state.apply(op)),
            // A crash mid-append leaves at most one torn line, and only at the end.
            Err(e) if i + 1 == lines.len() => {
                warn!(path = %path.display(), "discarding torn journal tail: {e}");
            }
            Err(e) => return Err(e.into()),
        }
    }

    Ok(state)
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

struct Writer {
    journal: Option<Journal>,
}

struct Shared {
    committed: Mutex<Arc<StoreState>>,
    writer: Arc<AsyncMutex<Writer>>,
}

impl Shared {
    fn snapshot(&self) -> Arc<StoreState> {
        Arc::clone(&self.committed.lock().unwrap_or_else(PoisonError::into_inner))
    }

    fn publish(&self, state: StoreState) {
        *self.committed.lock().unwrap_or_else(PoisonError::into_inner) = Arc::new(state);
    }
}

/// In-memory [`DurableStore`]. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct MemoryStore {
    shared: Arc<Shared>,
}

impl MemoryStore {
    /// A volatile store. State is lost when the last clone is dropped.
    pub fn new() -> Self {
        Self::with_state(StoreState::default(), None)
    }

    /// A store persisted to a journal file at `path`, created if missing.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let (journal, state) = Journal::open(path.as_ref()).await?;
        Ok(Self::with_state(state, Some(journal)))
    }

    fn with_state(state: StoreState, journal: Option<Journal>) -> Self {
        Self {
            shared: Arc::new(Shared {
                committed: Mutex::new(Arc::new(state)),
                writer: Arc::new(AsyncMutex::new(Writer { journal })),
            }),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DurableStore for MemoryStore {
    async fn begin(&self, mode: TxMode) -> Result<Box<dyn Transaction>> {
        let writer = match mode {
            TxMode::ReadWrite => Some(Arc::clone(&self.shared.writer).lock_owned().await),
            TxMode::ReadOnly => None,
        };
        // Taken after the writer lock so a writer always starts from the latest commit.
        let base = self.shared.snapshot();

        Ok(Box::new(MemoryTx {
            shared: Arc::clone(&self.shared),
            base,
            working: None,
            ops: Vec::new(),
            writer,
        }))
    }
}

// ---------------------------------------------------------------------------
// Transaction
// ---------------------------------------------------------------------------

struct MemoryTx {
    shared: Arc<Shared>,
    base: Arc<StoreState>,
    /// Private copy, made on the first mutation.
    working: Option<StoreState>,
    ops: Vec<Op>,
    /// Held for the life of a read-write transaction; `None` when read-only.
    writer: Option<OwnedMutexGuard<Writer>>,
}

impl MemoryTx {
    async fn finish(mut self: Box<Self>) -> Result<()> {
        let Some(working) = self.working.take() else {
            return Ok(());
        };
        if let Some(journal) = self.writer.as_mut().and_then(|w| w.journal.as_mut()) {
            journal.append(&self.ops).await?;
        }
        debug!(ops = self.ops.len(), "memory transaction committed");
        self.shared.publish(working);
        Ok(())
    }

    fn view(&self) -> &StoreState {
        self.working.as_ref().unwrap_or(&self.base)
    }

    fn ensure_writable(&self) -> Result<()> {
        if self.writer.is_some() {
            Ok(())
        } else {
            Err(Error::ReadOnly)
        }
    }

    fn record(&mut self, op: Op) -> Result<()> {
        self.ensure_writable()?;
        let base = &self.base;
        self.working
            .get_or_insert_with(|| StoreState::clone(base))
            .apply(&op);
        self.ops.push(op);
        Ok(())
    }
}

#[async_trait]
impl Transaction for MemoryTx {
    async fn enqueue(&mut self, queue: QueueName, item: &str) -> Result<()> {
        self.record(Op::Enqueue {
            queue,
            item: item.to_string(),
        })
    }

    async fn try_dequeue(&mut self, queue: QueueName) -> Result<Option<String>> {
        self.ensure_writable()?;
        let Some(head) = self.view().queue(queue).front().cloned() else {
            return Ok(None);
        };
        self.record(Op::Dequeue { queue })?;
        Ok(Some(head))
    }

    async fn drain(&mut self, queue: QueueName) -> Result<u64> {
        self.ensure_writable()?;
        let drained = self.view().queue(queue).len() as u64;
        if drained > 0 {
            self.record(Op::Drain { queue })?;
        }
        Ok(drained)
    }

    async fn queue_len(&mut self, queue: QueueName) -> Result<u64> {
        Ok(self.view().queue(queue).len() as u64)
    }

    async fn put(&mut self, key: &str, value: f64) -> Result<()> {
        self.record(Op::Put {
            key: key.to_string(),
            value,
        })
    }

    async fn get(&mut self, key: &str) -> Result<Option<f64>> {
        Ok(self.view().scores.get(key).copied())
    }

    async fn delete(&mut self, key: &str) -> Result<bool> {
        self.ensure_writable()?;
        if !self.view().scores.contains_key(key) {
            return Ok(false);
        }
        self.record(Op::Delete {
            key: key.to_string(),
        })?;
        Ok(true)
    }

    async fn clear(&mut self) -> Result<()> {
        self.ensure_writable()?;
        if !self.view().scores.is_empty() {
            self.record(Op::Clear)?;
        }
        Ok(())
    }

    async fn count(&mut self) -> Result<u64> {
        Ok(self.view().scores.len() as u64)
    }

    async fn iterate(&mut self) -> Result<Vec<(String, f64)>> {
        Ok(self
            .view()
            .scores
            .iter()
            .map(|(k, v)| (k.clone(), *v))
            .collect())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        if self.working.is_none() {
            return Ok(());
        }
        // The append and the publish run on their own task so that dropping
        // this future cannot leave a journaled commit unpublished.
        tokio::spawn(self.finish())
            .await
            .map_err(|e| Error::Other(format!("commit task failed: {e}")))?
    }

    async fn abort(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}
