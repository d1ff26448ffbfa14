//! Transactional durable store: named FIFO queues plus one score map.
//!
//! Every pipeline mutation goes through a [`Transaction`]. A transaction
//! either commits all of its operations or none of them; dropping one
//! without committing is an abort.
//!
//! Two realizations ship with the crate: Postgres ([`crate::db::Db`]) and
//! an in-memory snapshot store with an optional journal ([`memory::MemoryStore`]).

pub mod memory;

use async_trait::async_trait;

use crate::error::Result;
use crate::model::QueueName;

pub use memory::MemoryStore;

/// Whether a transaction may mutate state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxMode {
    ReadWrite,
    /// Snapshot read. Every read in the transaction sees the same committed state.
    ReadOnly,
}

/// A transactional queue + map service.
#[async_trait]
pub trait DurableStore: Send + Sync {
    /// Open a transaction.
    async fn begin(&self, mode: TxMode) -> Result<Box<dyn Transaction>>;

    /// Cheap liveness check of the backing storage.
    async fn health_check(&self) -> Result<()> {
        Ok(())
    }
}

/// One open transaction against a [`DurableStore`].
///
/// Mutating calls on a [`TxMode::ReadOnly`] transaction fail with
/// [`crate::error::Error::ReadOnly`].
#[async_trait]
pub trait Transaction: Send {
    /// Append `item` to the tail of `queue`.
    async fn enqueue(&mut self, queue: QueueName, item: &str) -> Result<()>;

    /// Remove and return the head of `queue`, if any.
    async fn try_dequeue(&mut self, queue: QueueName) -> Result<Option<String>>;

    /// Remove every item from `queue`, returning how many were removed.
    async fn drain(&mut self, queue: QueueName) -> Result<u64> {
        let mut drained = 0;
        while self.try_dequeue(queue).await?.is_some() {
            drained += 1;
        }
        Ok(drained)
    }

    /// Number of items currently in `queue`.
    async fn queue_len(&mut self, queue: QueueName) -> Result<u64>;

    /// Insert or overwrite the score for `key`.
    async fn put(&mut self, key: &str, value: f64) -> Result<()>;

    async fn get(&mut self, key: &str) -> Result<Option<f64>>;

    /// Remove `key`, returning whether it was present.
    async fn delete(&mut self, key: &str) -> Result<bool>;

    /// Remove every entry from the score map.
    async fn clear(&mut self) -> Result<()>;

    /// Number of entries in the score map.
    async fn count(&mut self) -> Result<u64>;

    /// All `(key, score)` pairs. Order is unspecified.
    async fn iterate(&mut self) -> Result<Vec<(String, f64)>>;

    async fn commit(self: Box<Self>) -> Result<()>;

    async fn abort(self: Box<Self>) -> Result<()>;
}
