//! Runtime configuration, read from the environment with sane defaults

use crate::error::{MemoraiError, Result};
use std::time::Duration;

pub const DEFAULT_DATABASE_URL: &str = "sqlite://memorai.db";
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_RESEARCH_BASE_URL: &str = "https://api.perplexity.ai";

/// Configuration shared by the batch process, the server and the CLI
#[derive(Debug, Clone, PartialEq)]
pub struct MemoraiConfig {
    /// SQLite connection string
    pub database_url: String,
    /// API key for chat completion and embeddings
    pub openai_api_key: Option<String>,
    /// Base URL of the OpenAI-compatible API
    pub openai_base_url: String,
    /// Model used for chat replies
    pub chat_model: String,
    /// Model used to condense conversations
    pub summary_model: String,
    /// Model used for embeddings
    pub embedding_model: String,
    /// Dimension produced by `embedding_model`
    pub embedding_dimension: usize,
    /// Length of the window each batch cycle summarizes
    pub batch_window: Duration,
    /// Time between batch cycles
    pub batch_interval: Duration,
    /// Number of summaries retrieved per prompt
    pub retrieval_top_k: usize,
    /// Number of recent turns sent with each chat request
    pub history_limit: usize,
    /// Bound on a single connect + ping at startup
    pub store_connect_timeout: Duration,
    /// Startup connection attempts before giving up
    pub store_connect_attempts: u32,
    /// Sleep between startup connection attempts
    pub store_retry_backoff: Duration,
    /// API key for the research model; research is disabled without it
    pub research_api_key: Option<String>,
    pub research_base_url: String,
    pub research_model: String,
    /// Server bind address
    pub bind_address: String,
}

impl Default for MemoraiConfig {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.to_string(),
            openai_api_key: None,
            openai_base_url: DEFAULT_OPENAI_BASE_URL.to_string(),
            chat_model: "gpt-4o-mini".to_string(),
            summary_model: "gpt-4-turbo-preview".to_string(),
            embedding_model: "text-embedding-ada-002".to_string(),
            embedding_dimension: 1536,
            batch_window: Duration::from_secs(3 * 60 * 60),
            batch_interval: Duration::from_secs(10 * 60),
            retrieval_top_k: 3,
            history_limit: 10,
            store_connect_timeout: Duration::from_secs(5),
            store_connect_attempts: 3,
            store_retry_backoff: Duration::from_secs(2),
            research_api_key: None,
            research_base_url: DEFAULT_RESEARCH_BASE_URL.to_string(),
            research_model: "sonar".to_string(),
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

impl MemoraiConfig {
    /// Read configuration from the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut config = Self::default();

        if let Some(v) = get("DATABASE_URL") {
            config.database_url = v;
        }
        config.openai_api_key = get("OPENAI_API_KEY");
        if let Some(v) = get("OPENAI_BASE_URL") {
            config.openai_base_url = v;
        }
        if let Some(v) = get("CHAT_MODEL") {
            config.chat_model = v;
        }
        if let Some(v) = get("SUMMARY_MODEL") {
            config.summary_model = v;
        }
        if let Some(v) = get("EMBEDDING_MODEL") {
            config.embedding_model = v;
        }
        if let Some(v) = get("EMBEDDING_DIMENSION") {
            config.embedding_dimension = parse_number("EMBEDDING_DIMENSION", &v)?;
        }
        if let Some(v) = get("BATCH_WINDOW_SECS") {
            config.batch_window = Duration::from_secs(parse_number("BATCH_WINDOW_SECS", &v)?);
        }
        if let Some(v) = get("BATCH_INTERVAL_SECS") {
            config.batch_interval =
                Duration::from_secs(parse_number("BATCH_INTERVAL_SECS", &v)?);
        }
        if let Some(v) = get("RETRIEVAL_TOP_K") {
            config.retrieval_top_k = parse_number("RETRIEVAL_TOP_K", &v)?;
        }
        if let Some(v) = get("HISTORY_LIMIT") {
            config.history_limit = parse_number("HISTORY_LIMIT", &v)?;
        }
        if let Some(v) = get("STORE_CONNECT_TIMEOUT_SECS") {
            config.store_connect_timeout =
                Duration::from_secs(parse_number("STORE_CONNECT_TIMEOUT_SECS", &v)?);
        }
        if let Some(v) = get("STORE_CONNECT_ATTEMPTS") {
            config.store_connect_attempts = parse_number("STORE_CONNECT_ATTEMPTS", &v)?;
        }
        if let Some(v) = get("STORE_RETRY_BACKOFF_SECS") {
            config.store_retry_backoff =
                Duration::from_secs(parse_number("STORE_RETRY_BACKOFF_SECS", &v)?);
        }
        config.research_api_key = get("RESEARCH_API_KEY");
        if let Some(v) = get("RESEARCH_BASE_URL") {
            config.research_base_url = v;
        }
        if let Some(v) = get("RESEARCH_MODEL") {
            config.research_model = v;
        }
        if let Some(v) = get("BIND_ADDRESS") {
            config.bind_address = v;
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject values the pipeline cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.batch_window.is_zero() {
            return Err(MemoraiError::Configuration(
                "batch window must be longer than zero".into(),
            ));
        }
        let window = self.batch_window_chrono()?;
        if chrono::Utc::now().checked_sub_signed(window).is_none() {
            return Err(MemoraiError::Configuration(format!(
                "batch window of {}s reaches before the earliest representable time",
                self.batch_window.as_secs()
            )));
        }
        if self.batch_interval.is_zero() {
            return Err(MemoraiError::Configuration(
                "batch interval must be longer than zero".into(),
            ));
        }
        if self.retrieval_top_k == 0 {
            return Err(MemoraiError::Configuration(
                "retrieval top-k must be at least 1".into(),
            ));
        }
        if self.store_connect_attempts == 0 {
            return Err(MemoraiError::Configuration(
                "store connect attempts must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// API key for model calls, or a configuration error naming the variable
    pub fn require_openai_key(&self) -> Result<&str> {
        self.openai_api_key
            .as_deref()
            .ok_or_else(|| MemoraiError::Configuration("OPENAI_API_KEY is not set".into()))
    }

    /// Batch window as a chrono duration
    pub fn batch_window_chrono(&self) -> Result<chrono::Duration> {
        chrono::Duration::from_std(self.batch_window)
            .map_err(|e| MemoraiError::Configuration(format!("batch window out of range: {e}")))
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse::<T>()
        .map_err(|e| MemoraiError::Configuration(format!("{key}={value:?}: {e}")))
}

/// Builder for [`MemoraiConfig`]
pub struct MemoraiConfigBuilder {
    config: MemoraiConfig,
}

impl MemoraiConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: MemoraiConfig::default(),
        }
    }

    pub fn database_url(mut self, url: impl Into<String>) -> Self {
        self.config.database_url = url.into();
        self
    }

    pub fn openai_api_key(mut self, key: impl Into<String>) -> Self {
        self.config.openai_api_key = Some(key.into());
        self
    }

    pub fn openai_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.openai_base_url = url.into();
        self
    }

    pub fn batch_window(mut self, window: Duration) -> Self {
        self.config.batch_window = window;
        self
    }

    pub fn batch_interval(mut self, interval: Duration) -> Self {
        self.config.batch_interval = interval;
        self
    }

    pub fn retrieval_top_k(mut self, k: usize) -> Self {
        self.config.retrieval_top_k = k;
        self
    }

    pub fn history_limit(mut self, limit: usize) -> Self {
        self.config.history_limit = limit;
        self
    }

    pub fn store_connect_attempts(mut self, attempts: u32) -> Self {
        self.config.store_connect_attempts = attempts;
        self
    }

    pub fn store_retry_backoff(mut self, backoff: Duration) -> Self {
        self.config.store_retry_backoff = backoff;
        self
    }

    pub fn build(self) -> MemoraiConfig {
        self.config
    }
}

impl Default for MemoraiConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
