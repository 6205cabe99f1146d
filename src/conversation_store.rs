//! Append-only per-user chat log

use crate::error::{MemoraiError, Result};
use crate::types::{ConversationTurn, Role, UserId};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use std::collections::BTreeSet;
use std::sync::Arc;

/// Storage contract for conversation turns
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Distinct users with at least one turn at or after `since`
    async fn list_active_users(&self, since: DateTime<Utc>) -> Result<BTreeSet<UserId>>;

    /// Turns with `start <= timestamp <= end`, oldest first
    async fn list_turns(
        &self,
        user_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<ConversationTurn>>;

    /// The `limit` most recent turns, newest first
    async fn list_recent(&self, user_id: &str, limit: usize) -> Result<Vec<ConversationTurn>>;

    /// Every turn for a user, oldest first
    async fn list_all(&self, user_id: &str) -> Result<Vec<ConversationTurn>>;

    /// Store a new turn stamped with the current time
    async fn append(&self, user_id: &str, role: Role, content: &str) -> Result<ConversationTurn>;

    /// Set feedback flags on the turn identified by user and timestamp.
    ///
    /// `None` leaves a flag untouched; at least one flag must be given.
    async fn set_flags(
        &self,
        user_id: &str,
        timestamp: DateTime<Utc>,
        liked: Option<bool>,
        disliked: Option<bool>,
    ) -> Result<()>;
}

/// SQLite-backed conversation log
#[derive(Clone)]
pub struct SqliteConversationStore {
    pool: SqlitePool,
}

impl std::fmt::Debug for SqliteConversationStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteConversationStore")
            .field("pool", &"<SqlitePool>")
            .finish()
    }
}

impl SqliteConversationStore {
    pub fn new(pool: SqlitePool) -> Arc<Self> {
        Arc::new(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Insert a fully formed turn (keeps its id and timestamp)
    pub async fn insert(&self, turn: &ConversationTurn) -> Result<()> {
        if turn.role == Role::System {
            return Err(MemoraiError::Validation(
                "system messages are not stored as conversation turns".into(),
            ));
        }

        sqlx::query(
            r#"
            INSERT INTO conversations (id, user_id, role, content, created_at, liked, disliked)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&turn.id)
        .bind(&turn.user_id)
        .bind(turn.role.as_str())
        .bind(&turn.content)
        .bind(turn.timestamp)
        .bind(turn.liked)
        .bind(turn.disliked)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl ConversationStore for SqliteConversationStore {
    async fn list_active_users(&self, since: DateTime<Utc>) -> Result<BTreeSet<UserId>> {
        let rows = sqlx::query("SELECT DISTINCT user_id FROM conversations WHERE created_at >= ?")
            .bind(since)
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|row| Ok(row.try_get::<String, _>("user_id")?))
            .collect()
    }

    async fn list_turns(
        &self,
        user_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<ConversationTurn>> {
        let rows = sqlx::query(
            r#"
            SELECT id, user_id, role, content, created_at, liked, disliked
            FROM conversations
            WHERE user_id = ? AND created_at >= ? AND created_at <= ?
            ORDER BY created_at ASC, rowid ASC
            "#,
        )
        .bind(user_id)
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_turn).collect()
    }

    async fn list_recent(&self, user_id: &str, limit: usize) -> Result<Vec<ConversationTurn>> {
        let rows = sqlx::query(
            r#"
            SELECT id, user_id, role, content, created_at, liked, disliked
            FROM conversations
            WHERE user_id = ?
            ORDER BY created_at DESC, rowid DESC
            LIMIT ?
            "#,
        )
        .bind(user_id)
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_turn).collect()
    }

    async fn list_all(&self, user_id: &str) -> Result<Vec<ConversationTurn>> {
        let rows = sqlx::query(
            r#"
            SELECT id, user_id, role, content, created_at, liked, disliked
            FROM conversations
            WHERE user_id = ?
            ORDER BY created_at ASC, rowid ASC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_turn).collect()
    }

    async fn append(&self, user_id: &str, role: Role, content: &str) -> Result<ConversationTurn> {
        let turn = ConversationTurn::new(user_id, role, content);
        self.insert(&turn).await?;
        tracing::debug!(user_id, role = %role, id = %turn.id, "Stored conversation turn");
        Ok(turn)
    }

    async fn set_flags(
        &self,
        user_id: &str,
        timestamp: DateTime<Utc>,
        liked: Option<bool>,
        disliked: Option<bool>,
    ) -> Result<()> {
        if liked.is_none() && disliked.is_none() {
            return Err(MemoraiError::Validation(
                "at least one of liked/disliked must be set".into(),
            ));
        }

        let result = sqlx::query(
            r#"
            UPDATE conversations
            SET liked = COALESCE(?, liked), disliked = COALESCE(?, disliked)
            WHERE user_id = ? AND created_at = ?
            "#,
        )
        .bind(liked)
        .bind(disliked)
        .bind(user_id)
        .bind(timestamp)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(MemoraiError::NotFound(format!(
                "no message for user {user_id} at {}",
                timestamp.to_rfc3339()
            )));
        }

        Ok(())
    }
}

/// Helper: Convert database row to ConversationTurn
fn row_to_turn(row: &SqliteRow) -> Result<ConversationTurn> {
    let role: String = row.try_get("role")?;

    Ok(ConversationTurn {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        role: Role::parse(&role)?,
        content: row.try_get("content")?,
        timestamp: row.try_get("created_at")?,
        liked: row.try_get("liked")?,
        disliked: row.try_get("disliked")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::connect_in_memory;
    use chrono::Duration;

    async fn store() -> Arc<SqliteConversationStore> {
        SqliteConversationStore::new(connect_in_memory().await.unwrap())
    }

    async fn insert_at(
        store: &SqliteConversationStore,
        user: &str,
        role: Role,
        text: &str,
        at: DateTime<Utc>,
    ) -> ConversationTurn {
        let turn = ConversationTurn::new(user, role, text).with_timestamp(at);
        store.insert(&turn).await.unwrap();
        turn
    }

    #[tokio::test]
    async fn window_reads_are_boundary_inclusive() {
        let store = store().await;
        let end = Utc::now();
        let start = end - Duration::hours(3);

        insert_at(&store, "u1", Role::User, "before", start - Duration::seconds(1)).await;
        insert_at(&store, "u1", Role::User, "at start", start).await;
        insert_at(&store, "u1", Role::Assistant, "middle", start + Duration::hours(1)).await;
        insert_at(&store, "u1", Role::User, "at end", end).await;
        insert_at(&store, "u1", Role::User, "after", end + Duration::seconds(1)).await;
        insert_at(&store, "u2", Role::User, "other user", start + Duration::hours(1)).await;

        let turns = store.list_turns("u1", start, end).await.unwrap();
        let contents: Vec<&str> = turns.iter().map(|t| t.content.as_str()).collect();
        assert_eq!(contents, vec!["at start", "middle", "at end"]);
    }

    #[tokio::test]
    async fn window_reads_sort_by_timestamp_not_insertion() {
        let store = store().await;
        let end = Utc::now();
        let start = end - Duration::hours(3);

        insert_at(&store, "u1", Role::User, "third", start + Duration::hours(2)).await;
        insert_at(&store, "u1", Role::User, "first", start + Duration::minutes(10)).await;
        insert_at(&store, "u1", Role::Assistant, "second", start + Duration::hours(1)).await;

        let turns = store.list_turns("u1", start, end).await.unwrap();
        let contents: Vec<&str> = turns.iter().map(|t| t.content.as_str()).collect();
        assert_eq!(contents, vec!["first", "second", "third"]);
        assert!(turns.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
    }

    #[tokio::test]
    async fn closed_pool_is_a_connectivity_error() {
        let store = store().await;
        store.pool().close().await;

        let err = store
            .list_active_users(Utc::now() - Duration::hours(3))
            .await
            .unwrap_err();
        assert!(err.is_connectivity(), "unexpected error: {err}");
    }

    #[tokio::test]
    async fn active_users_collapse_duplicates() {
        let store = store().await;
        let now = Utc::now();

        insert_at(&store, "u1", Role::User, "a", now - Duration::minutes(5)).await;
        insert_at(&store, "u1", Role::Assistant, "b", now - Duration::minutes(4)).await;
        insert_at(&store, "u2", Role::User, "c", now - Duration::minutes(3)).await;
        insert_at(&store, "stale", Role::User, "d", now - Duration::hours(5)).await;

        let users = store
            .list_active_users(now - Duration::hours(3))
            .await
            .unwrap();
        assert_eq!(users.into_iter().collect::<Vec<_>>(), vec!["u1", "u2"]);
    }

    #[tokio::test]
    async fn recent_is_newest_first_and_limited() {
        let store = store().await;
        let now = Utc::now();
        for i in 0..5 {
            insert_at(&store, "u1", Role::User, &format!("m{i}"), now + Duration::seconds(i)).await;
        }

        let recent = store.list_recent("u1", 3).await.unwrap();
        let contents: Vec<&str> = recent.iter().map(|t| t.content.as_str()).collect();
        assert_eq!(contents, vec!["m4", "m3", "m2"]);

        let all = store.list_all("u1").await.unwrap();
        assert_eq!(all.first().unwrap().content, "m0");
        assert_eq!(all.len(), 5);
    }

    #[tokio::test]
    async fn append_round_trips_role_and_content() {
        let store = store().await;
        let turn = store.append("u1", Role::Assistant, "Nice, where?").await.unwrap();

        let all = store.list_all("u1").await.unwrap();
        assert_eq!(all, vec![turn]);
    }

    #[tokio::test]
    async fn system_turns_are_rejected() {
        let store = store().await;
        let err = store.append("u1", Role::System, "nope").await.unwrap_err();
        assert!(matches!(err, MemoraiError::Validation(_)));
    }

    #[tokio::test]
    async fn set_flags_updates_only_given_flags() {
        let store = store().await;
        let turn = store.append("u1", Role::Assistant, "reply").await.unwrap();

        store
            .set_flags("u1", turn.timestamp, Some(true), None)
            .await
            .unwrap();
        store
            .set_flags("u1", turn.timestamp, None, Some(true))
            .await
            .unwrap();
        store
            .set_flags("u1", turn.timestamp, Some(false), None)
            .await
            .unwrap();

        let stored = store.list_all("u1").await.unwrap().remove(0);
        assert!(!stored.liked);
        assert!(stored.disliked);
    }

    #[tokio::test]
    async fn set_flags_reports_missing_turn_and_empty_update() {
        let store = store().await;
        let turn = store.append("u1", Role::User, "hello").await.unwrap();

        let err = store
            .set_flags("u2", turn.timestamp, Some(true), None)
            .await
            .unwrap_err();
        assert!(matches!(err, MemoraiError::NotFound(_)));

        let err = store
            .set_flags("u1", turn.timestamp, None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, MemoraiError::Validation(_)));
    }
}
