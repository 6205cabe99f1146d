use memorai::{ChatService, ConversationStore, MemoraiSystem, ResearchService};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub conversations: Arc<dyn ConversationStore>,
    pub chat: ChatService,
    /// Absent when no research API key is configured
    pub research: Option<ResearchService>,
}

impl AppState {
    pub fn from_system(system: &MemoraiSystem) -> memorai::Result<Self> {
        Ok(Self {
            conversations: system.conversations(),
            chat: system.chat()?,
            research: system.research()?,
        })
    }
}
