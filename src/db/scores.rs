//! Score map operations on the `tweet_scores` table.

use sqlx::PgConnection;

use crate::error::Result;

/// Insert or overwrite the score for `text`.
pub async fn upsert(conn: &mut PgConnection, text: &str, score: f64) -> Result<()> {
    sqlx::query(
        "INSERT INTO tweet_scores (tweet_text, score, updated_at)
         VALUES ($1, $2, now())
         ON CONFLICT (tweet_text) DO UPDATE SET score = EXCLUDED.score, updated_at = now()",
    )
    .bind(text)
    .bind(score)
    .execute(conn)
    .await?;
    Ok(())
}

pub async fn get(conn: &mut PgConnection, text: &str) -> Result<Option<f64>> {
    let row: Option<(f64,)> = sqlx::query_as("SELECT score FROM tweet_scores WHERE tweet_text = $1")
        .bind(text)
        .fetch_optional(conn)
        .await?;
    Ok(row.map(|r| r.0))
}

pub async fn delete(conn: &mut PgConnection, text: &str) -> Result<bool> {
    let affected = sqlx::query("DELETE FROM tweet_scores WHERE tweet_text = $1")
        .bind(text)
        .execute(conn)
        .await?
        .rows_affected();
    Ok(affected > 0)
}

pub async fn clear(conn: &mut PgConnection) -> Result<()> {
    sqlx::query("DELETE FROM tweet_scores").execute(conn).await?;
    Ok(())
}

pub async fn count(conn: &mut PgConnection) -> Result<u64> {
    let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM tweet_scores")
        .fetch_one(conn)
        .await?;
    Ok(row.0.max(0) as u64)
}

pub async fn all(conn: &mut PgConnection) -> Result<Vec<(String, f64)>> {
    let rows: Vec<(String, f64)> = sqlx::query_as("SELECT tweet_text, score FROM tweet_scores")
        .fetch_all(conn)
        .await?;
    Ok(rows)
}
