//! pgmq queue operations via direct SQLx.
//!
//! Calls pgmq's SQL functions: pgmq.create, pgmq.send, pgmq.pop,
//! pgmq.purge_queue, pgmq.metrics. Everything except `create` runs on the
//! caller's connection so it joins the caller's transaction.

use opentelemetry::KeyValue;
use sqlx::PgConnection;

use crate::error::{Error, Result};
use crate::model::QueueName;
use crate::telemetry::metrics;

fn record(queue: QueueName, operation: &'static str) {
    metrics::queue_operations().add(
        1,
        &[
            KeyValue::new("queue", queue.as_str()),
            KeyValue::new("operation", operation),
        ],
    );
}

impl super::Db {
    /// Create a pgmq queue (idempotent).
    pub async fn create_queue(&self, queue: QueueName) -> Result<()> {
        sqlx::query("SELECT pgmq.create($1)")
            .bind(queue.as_str())
            .execute(self.pool())
            .await?;
        record(queue, "create");
        Ok(())
    }
}

/// Send `item` to the tail of `queue`. Returns the message ID.
pub async fn send(conn: &mut PgConnection, queue: QueueName, item: &str) -> Result<i64> {
    let payload = serde_json::json!({ "text": item });
    let row: (i64,) = sqlx::query_as("SELECT pgmq.send($1, $2, $3)")
        .bind(queue.as_str())
        .bind(&payload)
        .bind(0i32)
        .fetch_one(conn)
        .await?;
    record(queue, "send");
    Ok(row.0)
}

/// Pop the oldest visible message from `queue`.
/// Returns None if the queue is empty.
pub async fn pop(conn: &mut PgConnection, queue: QueueName) -> Result<Option<String>> {
    let row: Option<(i64, serde_json::Value)> =
        sqlx::query_as("SELECT msg_id, message FROM pgmq.pop($1)")
            .bind(queue.as_str())
            .fetch_optional(conn)
            .await?;

    record(queue, if row.is_some() { "pop" } else { "pop_empty" });

    row.map(|(msg_id, message)| {
        message
            .get("text")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .ok_or_else(|| {
                Error::Other(format!(
                    "bad pgmq payload in {queue} (msg {msg_id}): missing text"
                ))
            })
    })
    .transpose()
}

/// Delete every message in `queue`. Returns how many were removed.
///
/// Unlike `pop`, this waits on rows locked by other transactions.
pub async fn purge(conn: &mut PgConnection, queue: QueueName) -> Result<u64> {
    let row: (i64,) = sqlx::query_as("SELECT pgmq.purge_queue($1)")
        .bind(queue.as_str())
        .fetch_one(conn)
        .await?;
    record(queue, "purge");
    Ok(row.0.max(0) as u64)
}

/// Current number of messages in `queue`.
pub async fn length(conn: &mut PgConnection, queue: QueueName) -> Result<u64> {
    let row: (i64,) = sqlx::query_as("SELECT queue_length FROM pgmq.metrics($1)")
        .bind(queue.as_str())
        .fetch_one(conn)
        .await?;
    Ok(row.0.max(0) as u64)
}
