//! A pipeline transaction on one pooled Postgres connection.

use async_trait::async_trait;
use sqlx::{PgPool, Postgres};

use super::{pgmq, scores};
use crate::error::{Error, Result};
use crate::model::QueueName;
use crate::store::{Transaction, TxMode};

/// Wraps a SQLx transaction. Dropping it without `commit` rolls back.
pub struct PgTransaction {
    tx: sqlx::Transaction<'static, Postgres>,
    mode: TxMode,
}

impl PgTransaction {
    /// Begin a transaction. Read-only transactions run at REPEATABLE READ
    /// so every read sees the same snapshot; writers use the default
    /// READ COMMITTED and rely on row locks.
    pub async fn begin(pool: &PgPool, mode: TxMode) -> Result<Self> {
        let mut tx = pool.begin().await?;
        if mode == TxMode::ReadOnly {
            sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ, READ ONLY")
                .execute(&mut *tx)
                .await?;
        }
        Ok(Self { tx, mode })
    }

    fn ensure_writable(&self) -> Result<()> {
        match self.mode {
            TxMode::ReadWrite => Ok(()),
            TxMode::ReadOnly => Err(Error::ReadOnly),
        }
    }
}

#[async_trait]
impl Transaction for PgTransaction {
    async fn enqueue(&mut self, queue: QueueName, item: &str) -> Result<()> {
        self.ensure_writable()?;
        pgmq::send(&mut self.tx, queue, item).await?;
        Ok(())
    }

    async fn try_dequeue(&mut self, queue: QueueName) -> Result<Option<String>> {
        self.ensure_writable()?;
        pgmq::pop(&mut self.tx, queue).await
    }

    async fn drain(&mut self, queue: QueueName) -> Result<u64> {
        self.ensure_writable()?;
        pgmq::purge(&mut self.tx, queue).await
    }

    async fn queue_len(&mut self, queue: QueueName) -> Result<u64> {
        pgmq::length(&mut self.tx, queue).await
    }

    async fn put(&mut self, key: &str, value: f64) -> Result<()> {
        self.ensure_writable()?;
        scores::upsert(&mut self.tx, key, value).await
    }

    async fn get(&mut self, key: &str) -> Result<Option<f64>> {
        scores::get(&mut self.tx, key).await
    }

    async fn delete(&mut self, key: &str) -> Result<bool> {
        self.ensure_writable()?;
        scores::delete(&mut self.tx, key).await
    }

    async fn clear(&mut self) -> Result<()> {
        self.ensure_writable()?;
        scores::clear(&mut self.tx).await
    }

    async fn count(&mut self) -> Result<u64> {
        scores::count(&mut self.tx).await
    }

    async fn iterate(&mut self) -> Result<Vec<(String, f64)>> {
        scores::all(&mut self.tx).await
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn abort(self: Box<Self>) -> Result<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}
