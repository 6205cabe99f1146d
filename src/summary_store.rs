//! Summary persistence and per-user similarity search

use crate::error::{MemoraiError, Result};
use crate::types::{ScoredSummary, SummaryRecord, TimeWindow};

use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use std::sync::Arc;
use tracing::warn;

/// Storage contract for window summaries
#[async_trait]
pub trait SummaryStore: Send + Sync {
    /// Insert, or replace summary and vector of the record with the same
    /// `(user_id, window.start, window.end)` key
    async fn upsert(&self, record: &SummaryRecord) -> Result<()>;

    /// Up to `k` of the user's summaries, closest (smallest cosine distance) first
    async fn nearest_neighbors(
        &self,
        user_id: &str,
        query: &[f32],
        k: usize,
    ) -> Result<Vec<ScoredSummary>>;

    /// All summaries for a user, newest window first
    async fn list_for_user(&self, user_id: &str) -> Result<Vec<SummaryRecord>>;
}

/// SQLite-backed summary store; vectors are stored as bincode blobs
#[derive(Clone)]
pub struct SqliteSummaryStore {
    pool: SqlitePool,
}

impl std::fmt::Debug for SqliteSummaryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteSummaryStore")
            .field("pool", &"<SqlitePool>")
            .finish()
    }
}

impl SqliteSummaryStore {
    pub fn new(pool: SqlitePool) -> Arc<Self> {
        Arc::new(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl SummaryStore for SqliteSummaryStore {
    async fn upsert(&self, record: &SummaryRecord) -> Result<()> {
        if record.window.end <= record.window.start {
            return Err(MemoraiError::Validation(format!(
                "summary window {} is empty",
                record.window
            )));
        }
        if record.window.end > Utc::now() {
            return Err(MemoraiError::Validation(format!(
                "summary window {} ends in the future",
                record.window
            )));
        }
        if record.vector.is_empty() {
            return Err(MemoraiError::Validation("summary vector is empty".into()));
        }

        let vector = bincode::serialize(&record.vector)
            .map_err(|e| MemoraiError::Serialization(e.to_string()))?;

        sqlx::query(
            r#"
            INSERT INTO conversation_summaries (
                id, user_id, summary, vector, dimension, start_time, end_time, created_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(user_id, start_time, end_time) DO UPDATE SET
                summary = excluded.summary,
                vector = excluded.vector,
                dimension = excluded.dimension
            "#,
        )
        .bind(&record.id)
        .bind(&record.user_id)
        .bind(&record.summary)
        .bind(vector)
        .bind(record.dimension() as i64)
        .bind(record.window.start)
        .bind(record.window.end)
        .bind(record.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn nearest_neighbors(
        &self,
        user_id: &str,
        query: &[f32],
        k: usize,
    ) -> Result<Vec<ScoredSummary>> {
        if query.is_empty() {
            return Err(MemoraiError::Validation("query vector is empty".into()));
        }
        if k == 0 {
            return Ok(Vec::new());
        }

        let rows = sqlx::query(
            r#"
            SELECT id, user_id, summary, vector, start_time, end_time, created_at
            FROM conversation_summaries
            WHERE user_id = ?
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        let mut scored = Vec::with_capacity(rows.len());
        for row in &rows {
            let record = row_to_summary(row)?;
            if record.dimension() != query.len() {
                warn!(
                    user_id,
                    summary_id = %record.id,
                    stored = record.dimension(),
                    query = query.len(),
                    "Skipping summary with mismatched vector dimension"
                );
                continue;
            }
            let distance = cosine_distance(query, &record.vector);
            scored.push(ScoredSummary { record, distance });
        }

        scored.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        scored.truncate(k);

        Ok(scored)
    }

    async fn list_for_user(&self, user_id: &str) -> Result<Vec<SummaryRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT id, user_id, summary, vector, start_time, end_time, created_at
            FROM conversation_summaries
            WHERE user_id = ?
            ORDER BY end_time DESC, start_time DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_summary).collect()
    }
}

/// Cosine distance `1 - cos(a, b)`; smaller is more similar.
///
/// Zero-norm or mismatched vectors are treated as orthogonal.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    1.0 - cosine_similarity(a, b)
}

/// Compute cosine similarity between two vectors
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}

/// Helper: Convert database row to SummaryRecord
fn row_to_summary(row: &SqliteRow) -> Result<SummaryRecord> {
    let blob: Vec<u8> = row.try_get("vector")?;
    let vector: Vec<f32> =
        bincode::deserialize(&blob).map_err(|e| MemoraiError::Serialization(e.to_string()))?;

    Ok(SummaryRecord {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        summary: row.try_get("summary")?,
        vector,
        window: TimeWindow {
            start: row.try_get("start_time")?,
            end: row.try_get("end_time")?,
        },
        created_at: row.try_get("created_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::connect_in_memory;
    use chrono::{DateTime, Duration};

    async fn store() -> Arc<SqliteSummaryStore> {
        SqliteSummaryStore::new(connect_in_memory().await.unwrap())
    }

    fn window(hours_ago: i64) -> TimeWindow {
        let end: DateTime<Utc> = Utc::now() - Duration::hours(hours_ago);
        TimeWindow::ending_at(end, Duration::hours(3)).unwrap()
    }

    #[test]
    fn test_cosine_similarity() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![1.0, 0.0, 0.0];
        assert!((cosine_similarity(&a, &b) - 1.0).abs() < 0.001);
        assert!(cosine_distance(&a, &b).abs() < 0.001);

        let c = vec![0.0, 1.0, 0.0];
        assert!((cosine_distance(&a, &c) - 1.0).abs() < 0.001);

        let d = vec![-1.0, 0.0, 0.0];
        assert!((cosine_distance(&a, &d) - 2.0).abs() < 0.001);
    }

    #[tokio::test]
    async fn upsert_same_key_replaces_summary_and_vector() {
        let store = store().await;
        let w = window(1);

        store
            .upsert(&SummaryRecord::new("u1", "first", vec![1.0, 0.0], w))
            .await
            .unwrap();
        store
            .upsert(&SummaryRecord::new("u1", "second", vec![0.0, 1.0], w))
            .await
            .unwrap();

        let records = store.list_for_user("u1").await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].summary, "second");
        assert_eq!(records[0].vector, vec![0.0, 1.0]);
        assert_eq!(records[0].window, w);
    }

    #[tokio::test]
    async fn distinct_windows_accumulate() {
        let store = store().await;
        store
            .upsert(&SummaryRecord::new("u1", "a", vec![1.0], window(1)))
            .await
            .unwrap();
        store
            .upsert(&SummaryRecord::new("u1", "b", vec![1.0], window(2)))
            .await
            .unwrap();

        assert_eq!(store.list_for_user("u1").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn nearest_neighbors_rank_by_distance_and_respect_k() {
        let store = store().await;
        store
            .upsert(&SummaryRecord::new("u1", "far", vec![-1.0, 0.0], window(1)))
            .await
            .unwrap();
        store
            .upsert(&SummaryRecord::new("u1", "near", vec![1.0, 0.1], window(2)))
            .await
            .unwrap();
        store
            .upsert(&SummaryRecord::new("u1", "middle", vec![0.0, 1.0], window(3)))
            .await
            .unwrap();

        let hits = store.nearest_neighbors("u1", &[1.0, 0.0], 2).await.unwrap();
        let summaries: Vec<&str> = hits.iter().map(|h| h.record.summary.as_str()).collect();
        assert_eq!(summaries, vec!["near", "middle"]);
        assert!(hits[0].distance <= hits[1].distance);

        let all = store.nearest_neighbors("u1", &[1.0, 0.0], 10).await.unwrap();
        assert_eq!(all.len(), 3);
    }

    #[tokio::test]
    async fn nearest_neighbors_never_cross_users() {
        let store = store().await;
        store
            .upsert(&SummaryRecord::new("a", "mine", vec![0.0, 1.0], window(1)))
            .await
            .unwrap();
        store
            .upsert(&SummaryRecord::new("b", "theirs", vec![1.0, 0.0], window(1)))
            .await
            .unwrap();

        let hits = store.nearest_neighbors("a", &[1.0, 0.0], 3).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert!(hits.iter().all(|h| h.record.user_id == "a"));
    }

    #[tokio::test]
    async fn empty_corpus_returns_empty() {
        let store = store().await;
        let hits = store.nearest_neighbors("nobody", &[1.0, 0.0], 3).await.unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn rejects_future_or_empty_records() {
        let store = store().await;
        let future = TimeWindow::ending_at(Utc::now() + Duration::hours(1), Duration::hours(3))
            .unwrap();
        let err = store
            .upsert(&SummaryRecord::new("u1", "s", vec![1.0], future))
            .await
            .unwrap_err();
        assert!(matches!(err, MemoraiError::Validation(_)));

        let err = store
            .upsert(&SummaryRecord::new("u1", "s", Vec::new(), window(1)))
            .await
            .unwrap_err();
        assert!(matches!(err, MemoraiError::Validation(_)));
    }
}
