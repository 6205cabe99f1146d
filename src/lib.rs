//! # Memorai - conversation memory for chat assistants
//!
//! Recent conversations are periodically condensed into per-user window
//! summaries, embedded, and stored. At chat time the closest summaries are
//! retrieved and woven into the prompt.
//!
//! ```no_run
//! use memorai::{MemoraiConfig, MemoraiSystem};
//!
//! # async fn run() -> memorai::Result<()> {
//! let system = MemoraiSystem::connect(MemoraiConfig::from_env()?).await?;
//! let reply = system.chat()?.handle_message("u1", "any hiking tips?").await?;
//! println!("{}", reply.content);
//! # Ok(())
//! # }
//! ```

pub mod chat;
pub mod config;
pub mod conversation_store;
pub mod db;
pub mod embedding;
pub mod error;
pub mod llm;
pub mod pipeline;
pub mod rag;
pub mod research;
pub mod scheduler;
pub mod summarizer;
pub mod summary_store;
pub mod types;

#[cfg(test)]
mod test_support;

pub use chat::{build_chat_messages, ChatService, CHAT_SYSTEM_PROMPT};
pub use config::{MemoraiConfig, MemoraiConfigBuilder};
pub use conversation_store::{ConversationStore, SqliteConversationStore};
pub use embedding::{EmbeddingProvider, OpenAiEmbeddingProvider};
pub use error::{MemoraiError, Result};
pub use llm::{ChatModel, OpenAiChatModel};
pub use pipeline::{BatchPipeline, CycleReport, OutcomeStatus, Stage, UserOutcome};
pub use rag::{build_prompt_with_context, EnhancedPrompt, PromptEnhancer};
pub use research::ResearchService;
pub use scheduler::{BatchScheduler, SchedulerStats};
pub use summarizer::{ChatSummarizer, Summarizer, SUMMARY_DIRECTIVE};
pub use summary_store::{cosine_distance, cosine_similarity, SqliteSummaryStore, SummaryStore};
pub use types::{
    ChatMessage, ConversationTurn, Role, ScoredSummary, SummaryRecord, TimeWindow, TurnId, UserId,
};

use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::info;

/// Stores plus configuration; hands out the services wired against them
#[derive(Clone)]
pub struct MemoraiSystem {
    config: MemoraiConfig,
    pool: SqlitePool,
    conversations: Arc<SqliteConversationStore>,
    summaries: Arc<SqliteSummaryStore>,
}

impl std::fmt::Debug for MemoraiSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoraiSystem")
            .field("database_url", &self.config.database_url)
            .finish()
    }
}

impl MemoraiSystem {
    /// Validate `config` and connect to its store, retrying unreachable stores
    pub async fn connect(config: MemoraiConfig) -> Result<Self> {
        config.validate()?;
        let pool = db::connect_with_retry(&config).await?;
        info!(database_url = %config.database_url, "Memorai store ready");
        Ok(Self::from_pool(config, pool))
    }

    /// Use an already migrated pool
    pub fn from_pool(config: MemoraiConfig, pool: SqlitePool) -> Self {
        Self {
            conversations: SqliteConversationStore::new(pool.clone()),
            summaries: SqliteSummaryStore::new(pool.clone()),
            config,
            pool,
        }
    }

    pub fn config(&self) -> &MemoraiConfig {
        &self.config
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn conversations(&self) -> Arc<SqliteConversationStore> {
        Arc::clone(&self.conversations)
    }

    pub fn summaries(&self) -> Arc<SqliteSummaryStore> {
        Arc::clone(&self.summaries)
    }

    /// Embedding client for the configured model
    pub fn embedder(&self) -> Result<Arc<dyn EmbeddingProvider>> {
        let provider = OpenAiEmbeddingProvider::new(
            self.config.require_openai_key()?,
            &self.config.openai_base_url,
            &self.config.embedding_model,
            self.config.embedding_dimension,
        )?;
        Ok(Arc::new(provider))
    }

    fn chat_model(&self, model: &str) -> Result<Arc<dyn ChatModel>> {
        let client = OpenAiChatModel::new(
            self.config.require_openai_key()?,
            &self.config.openai_base_url,
            model,
        )?;
        Ok(Arc::new(client))
    }

    pub fn enhancer(&self) -> Result<PromptEnhancer> {
        Ok(PromptEnhancer::new(self.embedder()?, self.summaries())
            .with_top_k(self.config.retrieval_top_k))
    }

    pub fn pipeline(&self) -> Result<BatchPipeline> {
        let summarizer = ChatSummarizer::new(self.chat_model(&self.config.summary_model)?);
        Ok(BatchPipeline::new(
            self.conversations(),
            self.summaries(),
            Arc::new(summarizer),
            self.embedder()?,
            self.config.batch_window_chrono()?,
        ))
    }

    pub fn scheduler(&self) -> Result<BatchScheduler> {
        Ok(BatchScheduler::new(
            self.pipeline()?,
            self.config.batch_interval,
        ))
    }

    pub fn chat(&self) -> Result<ChatService> {
        Ok(ChatService::new(
            self.conversations(),
            self.enhancer()?,
            self.chat_model(&self.config.chat_model)?,
        )
        .with_history_limit(self.config.history_limit))
    }

    /// `None` when no research API key is configured
    pub fn research(&self) -> Result<Option<ResearchService>> {
        let Some(key) = self.config.research_api_key.as_deref() else {
            return Ok(None);
        };
        let model = OpenAiChatModel::new(
            key,
            &self.config.research_base_url,
            &self.config.research_model,
        )?;
        Ok(Some(ResearchService::new(
            self.conversations(),
            Arc::new(model),
        )))
    }
}
