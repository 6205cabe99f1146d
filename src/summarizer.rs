//! Condenses an ordered run of conversation turns into one summary

use crate::error::{MemoraiError, Result};
use crate::llm::ChatModel;
use crate::types::{ChatMessage, ConversationTurn};

use async_trait::async_trait;
use std::sync::Arc;
use tracing::instrument;

/// Directive sent ahead of the turns being summarized
pub const SUMMARY_DIRECTIVE: &str =
    "Summarize the following conversation so that its concrete content is clear.";

#[async_trait]
pub trait Summarizer: Send + Sync {
    /// `turns` must be oldest first.
    async fn summarize(&self, turns: &[ConversationTurn]) -> Result<String>;
}

/// Summarizer backed by a single chat completion call
#[derive(Clone)]
pub struct ChatSummarizer {
    model: Arc<dyn ChatModel>,
    directive: String,
}

impl ChatSummarizer {
    pub fn new(model: Arc<dyn ChatModel>) -> Self {
        Self {
            model,
            directive: SUMMARY_DIRECTIVE.to_string(),
        }
    }

    pub fn with_directive(mut self, directive: impl Into<String>) -> Self {
        self.directive = directive.into();
        self
    }

    /// System directive followed by the turns in their original order
    pub fn build_messages(&self, turns: &[ConversationTurn]) -> Vec<ChatMessage> {
        std::iter::once(ChatMessage::system(self.directive.clone()))
            .chain(turns.iter().map(ConversationTurn::to_message))
            .collect()
    }
}

#[async_trait]
impl Summarizer for ChatSummarizer {
    #[instrument(skip(self, turns), fields(model = %self.model.model(), turns = turns.len()))]
    async fn summarize(&self, turns: &[ConversationTurn]) -> Result<String> {
        if turns.is_empty() {
            return Err(MemoraiError::Validation(
                "cannot summarize an empty conversation".into(),
            ));
        }

        let messages = self.build_messages(turns);
        self.model.complete(&messages).await
    }
}
