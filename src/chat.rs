//! One chat exchange: store the question, answer it with retrieved context, store the answer

use crate::conversation_store::ConversationStore;
use crate::error::{MemoraiError, Result};
use crate::llm::ChatModel;
use crate::rag::PromptEnhancer;
use crate::types::{ChatMessage, ConversationTurn, Role};

use std::sync::Arc;
use tracing::{info, instrument, warn};

pub const CHAT_SYSTEM_PROMPT: &str =
    "Answer the user's question with reference to the past conversation.";

pub const DEFAULT_HISTORY_LIMIT: usize = 10;

#[derive(Clone)]
pub struct ChatService {
    conversations: Arc<dyn ConversationStore>,
    enhancer: PromptEnhancer,
    model: Arc<dyn ChatModel>,
    history_limit: usize,
}

impl ChatService {
    pub fn new(
        conversations: Arc<dyn ConversationStore>,
        enhancer: PromptEnhancer,
        model: Arc<dyn ChatModel>,
    ) -> Self {
        Self {
            conversations,
            enhancer,
            model,
            history_limit: DEFAULT_HISTORY_LIMIT,
        }
    }

    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit;
        self
    }

    /// Answer `message` for `user_id` and return the stored assistant turn.
    ///
    /// The user turn is stored before the model is called, so it survives a
    /// failed completion.
    #[instrument(skip(self, message), fields(model = %self.model.model()))]
    pub async fn handle_message(&self, user_id: &str, message: &str) -> Result<ConversationTurn> {
        if user_id.trim().is_empty() {
            return Err(MemoraiError::Validation("user_id is required".into()));
        }
        if message.trim().is_empty() {
            return Err(MemoraiError::Validation("message is required".into()));
        }

        // Read history first so it never contains the turn stored below.
        let mut history = self
            .conversations
            .list_recent(user_id, self.history_limit)
            .await?;
        history.reverse();

        self.conversations
            .append(user_id, Role::User, message)
            .await?;

        let enhanced = self.enhancer.enhance_prompt(user_id, message).await;
        if let Some(e) = &enhanced.fallback {
            warn!(error = %e, "Prompt enhancement failed; using the raw message");
        }

        let messages = build_chat_messages(&history, &enhanced.text);
        let reply = self.model.complete(&messages).await?;

        let turn = self
            .conversations
            .append(user_id, Role::Assistant, &reply)
            .await?;

        info!(
            history = history.len(),
            context = enhanced.summaries_used.len(),
            reply_id = %turn.id,
            "Chat reply stored"
        );
        Ok(turn)
    }
}

/// System prompt, history oldest first, then the prompt as the final user message
pub fn build_chat_messages(history: &[ConversationTurn], prompt: &str) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(history.len() + 2);
    messages.push(ChatMessage::system(CHAT_SYSTEM_PROMPT));
    messages.extend(history.iter().map(ConversationTurn::to_message));
    messages.push(ChatMessage::user(prompt));
    messages
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation_store::SqliteConversationStore;
    use crate::db::connect_in_memory;
    use crate::embedding::EmbeddingProvider;
    use crate::rag::CONTEXT_PREAMBLE;
    use crate::summary_store::{SqliteSummaryStore, SummaryStore};
    use crate::test_support::{BagOfWordsEmbedder, ScriptedChatModel};
    use crate::types::{SummaryRecord, TimeWindow};
    use chrono::{Duration, SubsecRound, Utc};

    struct Fixture {
        conversations: Arc<SqliteConversationStore>,
        summaries: Arc<SqliteSummaryStore>,
    }

    impl Fixture {
        async fn new() -> Self {
            let pool = connect_in_memory().await.unwrap();
            Self {
                conversations: SqliteConversationStore::new(pool.clone()),
                summaries: SqliteSummaryStore::new(pool),
            }
        }

        fn service(&self, model: Arc<ScriptedChatModel>, embedder: BagOfWordsEmbedder) -> ChatService {
            let enhancer = PromptEnhancer::new(Arc::new(embedder), self.summaries.clone());
            ChatService::new(self.conversations.clone(), enhancer, model)
        }

        async fn seed(&self, user: &str, role: Role, text: &str, minutes_ago: i64) {
            let turn = ConversationTurn::new(user, role, text)
                .with_timestamp(Utc::now() - Duration::minutes(minutes_ago));
            self.conversations.insert(&turn).await.unwrap();
        }
    }

    #[tokio::test]
    async fn sends_system_history_and_prompt_then_stores_reply_once() {
        let fx = Fixture::new().await;
        fx.seed("u1", Role::User, "hi", 10).await;
        fx.seed("u1", Role::Assistant, "hello!", 9).await;

        let model = Arc::new(ScriptedChatModel::replying("Sure thing."));
        let service = fx.service(model.clone(), BagOfWordsEmbedder::new(16));

        let reply = service.handle_message("u1", "help me plan").await.unwrap();
        assert_eq!(reply.role, Role::Assistant);
        assert_eq!(reply.content, "Sure thing.");

        let calls = model.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(
            calls[0],
            vec![
                ChatMessage::system(CHAT_SYSTEM_PROMPT),
                ChatMessage::user("hi"),
                ChatMessage::assistant("hello!"),
                ChatMessage::user("help me plan"),
            ]
        );

        let all = fx.conversations.list_all("u1").await.unwrap();
        let contents: Vec<_> = all.iter().map(|t| t.content.as_str()).collect();
        assert_eq!(contents, vec!["hi", "hello!", "help me plan", "Sure thing."]);
    }

    #[tokio::test]
    async fn history_is_limited_to_most_recent_turns() {
        let fx = Fixture::new().await;
        for i in 0..5 {
            fx.seed("u1", Role::User, &format!("message {i}"), 50 - i).await;
        }

        let model = Arc::new(ScriptedChatModel::replying("ok"));
        let service = fx
            .service(model.clone(), BagOfWordsEmbedder::new(16))
            .with_history_limit(2);
        service.handle_message("u1", "latest").await.unwrap();

        let sent = &model.calls()[0];
        assert_eq!(sent.len(), 4);
        assert_eq!(sent[1], ChatMessage::user("message 3"));
        assert_eq!(sent[2], ChatMessage::user("message 4"));
    }

    #[tokio::test]
    async fn stored_summaries_are_woven_into_final_message() {
        let fx = Fixture::new().await;
        let embedder = BagOfWordsEmbedder::new(32);
        let vector = embedder.embed_one("user enjoys hiking").await.unwrap();
        let end = Utc::now().trunc_subsecs(0) - Duration::hours(1);
        fx.summaries
            .upsert(&SummaryRecord::new(
                "u1",
                "user enjoys hiking",
                vector,
                TimeWindow::ending_at(end, Duration::hours(3)).unwrap(),
            ))
            .await
            .unwrap();

        let model = Arc::new(ScriptedChatModel::replying("Bring water."));
        let service = fx.service(model.clone(), embedder);
        service.handle_message("u1", "any hiking tips?").await.unwrap();

        let last = model.calls()[0].last().cloned().unwrap();
        assert_eq!(last.role, Role::User);
        assert!(last.content.starts_with(CONTEXT_PREAMBLE));
        assert!(last.content.contains("- user enjoys hiking"));
        assert!(last.content.ends_with("any hiking tips?"));
    }

    #[tokio::test]
    async fn embedding_outage_still_answers_with_raw_message() {
        let fx = Fixture::new().await;
        let model = Arc::new(ScriptedChatModel::replying("answer"));
        let service = fx.service(model.clone(), BagOfWordsEmbedder::failing());

        service.handle_message("u1", "plain question").await.unwrap();
        assert_eq!(
            model.calls()[0].last(),
            Some(&ChatMessage::user("plain question"))
        );
    }

    #[tokio::test]
    async fn completion_failure_keeps_user_turn_only() {
        let fx = Fixture::new().await;
        let service = fx.service(Arc::new(ScriptedChatModel::failing()), BagOfWordsEmbedder::new(8));

        let err = service.handle_message("u1", "hello?").await.unwrap_err();
        assert!(err.is_upstream());

        let all = fx.conversations.list_all("u1").await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].role, Role::User);
    }

    #[tokio::test]
    async fn blank_input_is_rejected() {
        let fx = Fixture::new().await;
        let service = fx.service(Arc::new(ScriptedChatModel::replying("x")), BagOfWordsEmbedder::new(8));

        assert!(matches!(
            service.handle_message("u1", "   ").await,
            Err(MemoraiError::Validation(_))
        ));
        assert!(matches!(
            service.handle_message("", "hi").await,
            Err(MemoraiError::Validation(_))
        ));
    }
}
