//! Conversation turns, summaries and the time windows that tie them together

use crate::error::{MemoraiError, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for stored conversation turns
pub type TurnId = String;

/// Opaque user identifier
pub type UserId = String;

/// Who authored a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "system" => Ok(Role::System),
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            other => Err(MemoraiError::Validation(format!("unknown role: {other}"))),
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single message handed to a language model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// One stored chat turn.
///
/// Immutable once written except for the two feedback flags.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub id: TurnId,
    pub user_id: UserId,
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub liked: bool,
    pub disliked: bool,
}

impl ConversationTurn {
    /// Create a new turn stamped with the current time
    pub fn new(user_id: impl Into<UserId>, role: Role, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.into(),
            role,
            content: content.into(),
            timestamp: Utc::now(),
            liked: false,
            disliked: false,
        }
    }

    /// Override the timestamp
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn to_message(&self) -> ChatMessage {
        ChatMessage::new(self.role, self.content.clone())
    }
}

/// Closed time range `[start, end]` bounding the turns that feed one summary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    /// Build a window, rejecting empty or inverted ranges
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self> {
        if end <= start {
            return Err(MemoraiError::Validation(format!(
                "window end {end} must be after start {start}"
            )));
        }
        Ok(Self { start, end })
    }

    /// The window of length `duration` that ends at `end`
    pub fn ending_at(end: DateTime<Utc>, duration: Duration) -> Result<Self> {
        let start = end.checked_sub_signed(duration).ok_or_else(|| {
            MemoraiError::Validation(format!(
                "window of {}s before {end} is out of range",
                duration.num_seconds()
            ))
        })?;
        Self::new(start, end)
    }

    /// Boundary-inclusive membership
    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        self.start <= ts && ts <= self.end
    }

    pub fn duration(&self) -> Duration {
        self.end - self.start
    }
}

impl std::fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {}]", self.start.to_rfc3339(), self.end.to_rfc3339())
    }
}

/// A condensed summary of one user's activity in one window, with its embedding.
///
/// Natural key is `(user_id, window.start, window.end)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryRecord {
    pub id: String,
    pub user_id: UserId,
    pub summary: String,
    pub vector: Vec<f32>,
    pub window: TimeWindow,
    pub created_at: DateTime<Utc>,
}

impl SummaryRecord {
    pub fn new(
        user_id: impl Into<UserId>,
        summary: impl Into<String>,
        vector: Vec<f32>,
        window: TimeWindow,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.into(),
            summary: summary.into(),
            vector,
            window,
            created_at: Utc::now(),
        }
    }

    pub fn dimension(&self) -> usize {
        self.vector.len()
    }
}

/// A summary returned by a similarity query, with its cosine distance to the query
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredSummary {
    pub record: SummaryRecord,
    /// Smaller is more similar.
    pub distance: f32,
}
