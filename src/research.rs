//! Latest-topics briefing from a search-backed chat model

use crate::conversation_store::ConversationStore;
use crate::error::{MemoraiError, Result};
use crate::llm::ChatModel;
use crate::types::{ChatMessage, ConversationTurn, Role};

use std::sync::Arc;
use tracing::{info, instrument};

pub const RESEARCH_SYSTEM_PROMPT: &str = "Be precise and concise.";
pub const RESEARCH_USER_PROMPT: &str = "Tell me about at least five of the latest topics in AI.";

#[derive(Clone)]
pub struct ResearchService {
    conversations: Arc<dyn ConversationStore>,
    model: Arc<dyn ChatModel>,
}

impl ResearchService {
    pub fn new(conversations: Arc<dyn ConversationStore>, model: Arc<dyn ChatModel>) -> Self {
        Self {
            conversations,
            model,
        }
    }

    /// Ask for a topic briefing and store it as an assistant turn for `user_id`
    #[instrument(skip(self), fields(model = %self.model.model()))]
    pub async fn research(&self, user_id: &str) -> Result<ConversationTurn> {
        if user_id.trim().is_empty() {
            return Err(MemoraiError::Validation("user_id is required".into()));
        }

        let messages = [
            ChatMessage::system(RESEARCH_SYSTEM_PROMPT),
            ChatMessage::user(RESEARCH_USER_PROMPT),
        ];
        let reply = self.model.complete(&messages).await?;

        let turn = self
            .conversations
            .append(user_id, Role::Assistant, &reply)
            .await?;
        info!(reply_id = %turn.id, "Research reply stored");
        Ok(turn)
    }
}
