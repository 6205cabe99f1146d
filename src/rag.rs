//! Retrieval-augmented prompt construction
//!
//! A user query is embedded, the user's closest stored summaries are looked up,
//! and the query is wrapped with those summaries as context. Retrieval problems
//! never fail the request: the caller gets the original query back along with
//! the error that caused the fallback.

use crate::embedding::EmbeddingProvider;
use crate::error::MemoraiError;
use crate::summary_store::SummaryStore;
use crate::types::ScoredSummary;

use std::sync::Arc;
use tracing::{debug, instrument};

pub const CONTEXT_PREAMBLE: &str = "Here are summaries of relevant past conversations:";
pub const QUESTION_SEPARATOR: &str =
    "Taking the past conversations above into account, answer the following question:";

/// Number of summaries retrieved when no other value is configured
pub const DEFAULT_TOP_K: usize = 3;

/// Output of [`PromptEnhancer::enhance_prompt`]
#[derive(Debug)]
pub struct EnhancedPrompt {
    /// Text to send as the final user message
    pub text: String,
    /// Summaries woven into `text`, closest first
    pub summaries_used: Vec<ScoredSummary>,
    /// Set when retrieval failed and `text` is the unmodified query
    pub fallback: Option<MemoraiError>,
}

impl EnhancedPrompt {
    fn unchanged(query: &str, fallback: Option<MemoraiError>) -> Self {
        Self {
            text: query.to_string(),
            summaries_used: Vec::new(),
            fallback,
        }
    }

    pub fn is_augmented(&self) -> bool {
        !self.summaries_used.is_empty()
    }
}

#[derive(Clone)]
pub struct PromptEnhancer {
    embedder: Arc<dyn EmbeddingProvider>,
    summaries: Arc<dyn SummaryStore>,
    top_k: usize,
}

impl PromptEnhancer {
    pub fn new(embedder: Arc<dyn EmbeddingProvider>, summaries: Arc<dyn SummaryStore>) -> Self {
        Self {
            embedder,
            summaries,
            top_k: DEFAULT_TOP_K,
        }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    /// Wrap `query` with the user's most relevant past summaries.
    ///
    /// Read-only: nothing is written to any store.
    #[instrument(skip(self, query), fields(top_k = self.top_k))]
    pub async fn enhance_prompt(&self, user_id: &str, query: &str) -> EnhancedPrompt {
        let vector = match self.embedder.embed_one(query).await {
            Ok(vector) => vector,
            Err(e) => return EnhancedPrompt::unchanged(query, Some(e)),
        };

        let neighbors = match self
            .summaries
            .nearest_neighbors(user_id, &vector, self.top_k)
            .await
        {
            Ok(neighbors) => neighbors,
            Err(e) => return EnhancedPrompt::unchanged(query, Some(e)),
        };

        if neighbors.is_empty() {
            debug!("No stored summaries; using query as is");
            return EnhancedPrompt::unchanged(query, None);
        }

        debug!(
            retrieved = neighbors.len(),
            closest = neighbors[0].distance,
            "Augmenting query with past summaries"
        );

        let text = build_prompt_with_context(
            neighbors.iter().map(|n| n.record.summary.as_str()),
            query,
        );
        EnhancedPrompt {
            text,
            summaries_used: neighbors,
            fallback: None,
        }
    }
}

/// Preamble, one bullet per summary in the given order, separator, then the query verbatim
pub fn build_prompt_with_context<'a>(
    summaries: impl IntoIterator<Item = &'a str>,
    query: &str,
) -> String {
    let mut prompt = String::from(CONTEXT_PREAMBLE);
    prompt.push('\n');
    for summary in summaries {
        prompt.push_str("- ");
        prompt.push_str(summary);
        prompt.push('\n');
    }
    prompt.push('\n');
    prompt.push_str(QUESTION_SEPARATOR);
    prompt.push('\n');
    prompt.push_str(query);
    prompt
}
