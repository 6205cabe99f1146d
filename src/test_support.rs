//! In-process fakes substituted for the model-backed components in tests

use crate::conversation_store::ConversationStore;
use crate::embedding::EmbeddingProvider;
use crate::error::{MemoraiError, Result};
use crate::llm::ChatModel;
use crate::summarizer::Summarizer;
use crate::types::{ChatMessage, ConversationTurn, Role, UserId};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeSet, HashSet};
use std::sync::Mutex;

/// Chat model that returns a fixed reply (or fails) and records every request
pub struct ScriptedChatModel {
    reply: Option<String>,
    calls: Mutex<Vec<Vec<ChatMessage>>>,
}

impl ScriptedChatModel {
    pub fn replying(reply: impl Into<String>) -> Self {
        Self {
            reply: Some(reply.into()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            reply: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<Vec<ChatMessage>> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatModel for ScriptedChatModel {
    fn model(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        self.calls.lock().unwrap().push(messages.to_vec());
        self.reply
            .clone()
            .ok_or_else(|| MemoraiError::Generation("scripted failure".into()))
    }
}

/// Summarizer that joins turn contents, failing for selected users
#[derive(Default)]
pub struct JoiningSummarizer {
    fail_for: HashSet<String>,
}

impl JoiningSummarizer {
    pub fn failing_for(users: &[&str]) -> Self {
        Self {
            fail_for: users.iter().map(|u| u.to_string()).collect(),
        }
    }
}

#[async_trait]
impl Summarizer for JoiningSummarizer {
    async fn summarize(&self, turns: &[ConversationTurn]) -> Result<String> {
        if let Some(first) = turns.first() {
            if self.fail_for.contains(&first.user_id) {
                return Err(MemoraiError::Generation(format!(
                    "summarizer unavailable for {}",
                    first.user_id
                )));
            }
        }
        Ok(turns
            .iter()
            .map(|t| format!("{}: {}", t.role, t.content))
            .collect::<Vec<_>>()
            .join(" | "))
    }
}

/// Bag-of-words hashing embedder; texts sharing words land close together
pub struct BagOfWordsEmbedder {
    dimension: usize,
    fail: bool,
}

impl BagOfWordsEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            fail: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            dimension: 8,
            fail: true,
        }
    }

    fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];
        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let mut hash = 1469598103934665603u64;
            for b in token.to_lowercase().as_bytes() {
                hash ^= *b as u64;
                hash = hash.wrapping_mul(1099511628211u64);
            }
            vector[(hash as usize) % self.dimension] += 1.0;
        }
        // Keep every vector non-zero so distances stay finite.
        vector[0] += 0.01;
        vector
    }
}

#[async_trait]
impl EmbeddingProvider for BagOfWordsEmbedder {
    fn name(&self) -> &'static str {
        "bag-of-words"
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if self.fail {
            return Err(MemoraiError::Embedding("embedder offline".into()));
        }
        Ok(texts.iter().map(|t| self.embed_text(t)).collect())
    }
}

/// Conversation store whose every call fails as if the database were down
pub struct UnreachableConversationStore;

fn refused<T>() -> Result<T> {
    Err(MemoraiError::Connectivity("connection refused".into()))
}

#[async_trait]
impl ConversationStore for UnreachableConversationStore {
    async fn list_active_users(&self, _since: DateTime<Utc>) -> Result<BTreeSet<UserId>> {
        refused()
    }

    async fn list_turns(
        &self,
        _user_id: &str,
        _start: DateTime<Utc>,
        _end: DateTime<Utc>,
    ) -> Result<Vec<ConversationTurn>> {
        refused()
    }

    async fn list_recent(&self, _user_id: &str, _limit: usize) -> Result<Vec<ConversationTurn>> {
        refused()
    }

    async fn list_all(&self, _user_id: &str) -> Result<Vec<ConversationTurn>> {
        refused()
    }

    async fn append(&self, _user_id: &str, _role: Role, _content: &str) -> Result<ConversationTurn> {
        refused()
    }

    async fn set_flags(
        &self,
        _user_id: &str,
        _timestamp: DateTime<Utc>,
        _liked: Option<bool>,
        _disliked: Option<bool>,
    ) -> Result<()> {
        refused()
    }
}
