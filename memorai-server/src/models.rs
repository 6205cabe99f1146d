use memorai::ConversationTurn;
use serde::{Deserialize, Serialize};

// Fields are optional so a missing field is answered with 400 rather than
// axum's 422 extraction rejection.

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: Option<String>,
    pub user_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateFlagRequest {
    pub user_id: Option<String>,
    pub timestamp: Option<String>,
    pub is_liked: Option<bool>,
    pub is_disliked: Option<bool>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserQuery {
    pub user_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatResponse {
    pub reply: String,
    pub id: String,
    pub timestamp: String,
}

impl From<ConversationTurn> for ChatResponse {
    fn from(turn: ConversationTurn) -> Self {
        Self {
            timestamp: turn.timestamp.to_rfc3339(),
            reply: turn.content,
            id: turn.id,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationResponse {
    pub id: String,
    pub user_id: String,
    pub role: String,
    pub content: String,
    pub timestamp: String,
    pub is_liked: bool,
    pub is_disliked: bool,
}

impl From<ConversationTurn> for ConversationResponse {
    fn from(turn: ConversationTurn) -> Self {
        Self {
            role: turn.role.as_str().to_string(),
            timestamp: turn.timestamp.to_rfc3339(),
            id: turn.id,
            user_id: turn.user_id,
            content: turn.content,
            is_liked: turn.liked,
            is_disliked: turn.disliked,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ConversationsResponse {
    pub conversations: Vec<ConversationResponse>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}
