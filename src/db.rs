//! SQLite pool setup: bounded connect, startup retries, migrations

use crate::config::MemoraiConfig;
use crate::error::{MemoraiError, Result};

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;
use std::time::Duration;
use tracing::{info, warn};

/// Open the configured database, ping it within the configured timeout and run migrations
pub async fn connect(config: &MemoraiConfig) -> Result<SqlitePool> {
    if !config.database_url.starts_with("sqlite:") {
        return Err(MemoraiError::Configuration(format!(
            "DATABASE_URL must be a sqlite: URL, got {}",
            config.database_url
        )));
    }

    let options = SqliteConnectOptions::from_str(&config.database_url)
        .map_err(|e| MemoraiError::Configuration(format!("invalid DATABASE_URL: {e}")))?
        .create_if_missing(true);

    // Every connection to `:memory:` is its own database.
    let in_memory = config.database_url.contains(":memory:");
    let mut pool_options =
        SqlitePoolOptions::new().acquire_timeout(config.store_connect_timeout);
    if in_memory {
        pool_options = pool_options
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None);
    }

    let pool = pool_options.connect_lazy_with(options);
    ping(&pool, config.store_connect_timeout).await?;

    sqlx::migrate!("./migrations").run(&pool).await?;

    Ok(pool)
}

/// [`connect`] with a bounded number of attempts for unreachable stores.
///
/// Only connectivity failures are retried; anything else is returned at once.
pub async fn connect_with_retry(config: &MemoraiConfig) -> Result<SqlitePool> {
    let attempts = config.store_connect_attempts.max(1);
    let mut last_error = None;

    for attempt in 1..=attempts {
        match connect(config).await {
            Ok(pool) => {
                info!(attempt, "Connected to store");
                return Ok(pool);
            }
            Err(e) if e.is_connectivity() => {
                warn!(attempt, attempts, error = %e, "Failed to connect to store");
                last_error = Some(e);
                if attempt < attempts {
                    tokio::time::sleep(config.store_retry_backoff).await;
                }
            }
            Err(e) => return Err(e),
        }
    }

    Err(last_error.unwrap_or_else(|| {
        MemoraiError::Connectivity("no connection attempts were made".into())
    }))
}

/// Issue a trivial query, failing with `Connectivity` on error or timeout
pub async fn ping(pool: &SqlitePool, timeout: Duration) -> Result<()> {
    match tokio::time::timeout(timeout, sqlx::query("SELECT 1").execute(pool)).await {
        Ok(Ok(_)) => Ok(()),
        Ok(Err(e)) => Err(MemoraiError::Connectivity(format!("ping failed: {e}"))),
        Err(_) => Err(MemoraiError::Connectivity(format!(
            "ping timed out after {}s",
            timeout.as_secs()
        ))),
    }
}

/// Create a migrated in-memory database, mainly for tests and dry runs
pub async fn connect_in_memory() -> Result<SqlitePool> {
    let options = SqliteConnectOptions::new()
        .in_memory(true)
        .create_if_missing(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;

    Ok(pool)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MemoraiConfigBuilder;

    #[tokio::test]
    async fn connects_to_file_database_and_migrates() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}", dir.path().join("memorai.db").display());
        let config = MemoraiConfigBuilder::new().database_url(url).build();

        let pool = connect_with_retry(&config).await.unwrap();
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM conversation_summaries")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(row.0, 0);
    }

    #[tokio::test]
    async fn unreachable_store_is_connectivity_error_after_retries() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!(
            "sqlite://{}",
            dir.path().join("missing").join("nested").join("memorai.db").display()
        );
        let config = MemoraiConfigBuilder::new()
            .database_url(url)
            .store_connect_attempts(2)
            .store_retry_backoff(Duration::from_millis(1))
            .build();

        let err = connect_with_retry(&config).await.unwrap_err();
        assert!(err.is_connectivity(), "unexpected error: {err}");
    }

    #[tokio::test]
    async fn invalid_url_is_not_retried() {
        let config = MemoraiConfigBuilder::new()
            .database_url("postgres://localhost/memorai")
            .build();

        let err = connect_with_retry(&config).await.unwrap_err();
        assert!(matches!(err, MemoraiError::Configuration(_)));
    }
}
