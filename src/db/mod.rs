//! Postgres realization of the durable store.
//!
//! Queues are pgmq queues and the score map is the `tweet_scores` table.
//! Both are driven through one SQLx transaction so a dequeue, an enqueue and
//! a map write commit together or not at all.

pub mod pgmq;
pub mod scores;
pub mod transaction;

use async_trait::async_trait;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

use crate::error::Result;
use crate::model::QueueName;
use crate::store::{DurableStore, Transaction, TxMode};

pub use transaction::PgTransaction;

/// Database handle. Owns the connection pool shared by every transaction.
#[derive(Clone)]
pub struct Db {
    pool: PgPool,
}

impl Db {
    /// Connect to Postgres and create a connection pool.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(url)
            .await?;
        Ok(Self { pool })
    }

    /// Run all pending migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| crate::error::Error::Other(format!("migration failed: {e}")))?;
        Ok(())
    }

    /// Create every pipeline queue (idempotent).
    pub async fn ensure_queues(&self) -> Result<()> {
        for queue in QueueName::ALL {
            self.create_queue(queue).await?;
        }
        Ok(())
    }

    pub(crate) fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl DurableStore for Db {
    async fn begin(&self, mode: TxMode) -> Result<Box<dyn Transaction>> {
        Ok(Box::new(PgTransaction::begin(&self.pool, mode).await?))
    }

    /// Simple health check: run a SELECT 1.
    async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
