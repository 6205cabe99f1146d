use axum::{
    extract::{Query, State},
    http::{header, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use memorai::MemoraiError;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::models::{
    ChatRequest, ChatResponse, ConversationResponse, ConversationsResponse, ErrorResponse,
    MessageResponse, UpdateFlagRequest, UserQuery,
};
use crate::state::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/health", get(health_check))
        .route("/chat", post(chat))
        .route("/chat/update-flag", post(update_flag))
        .route("/chat/conversations", get(list_conversations))
        .route("/chat/research-ai", get(research_ai))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Error body `{"error": ...}` with a status derived from the failure kind
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }
}

impl From<MemoraiError> for ApiError {
    fn from(e: MemoraiError) -> Self {
        let status = match &e {
            MemoraiError::Validation(_) => StatusCode::BAD_REQUEST,
            MemoraiError::NotFound(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::error!(error = %e, "Request failed");
        }
        Self {
            status,
            message: e.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorResponse {
                error: self.message,
            }),
        )
            .into_response()
    }
}

fn required(value: Option<String>, name: &str) -> Result<String, ApiError> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| ApiError::bad_request(format!("{name} is required")))
}

pub async fn health_check() -> StatusCode {
    StatusCode::OK
}

pub async fn chat(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    let user_id = required(payload.user_id, "user_id")?;
    let message = required(payload.message, "message")?;

    let reply = state.chat.handle_message(&user_id, &message).await?;
    Ok(Json(reply.into()))
}

pub async fn update_flag(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<UpdateFlagRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    let user_id = required(payload.user_id, "userId")?;
    let raw_timestamp = required(payload.timestamp, "timestamp")?;
    let timestamp = DateTime::parse_from_rfc3339(&raw_timestamp)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| ApiError::bad_request(format!("invalid timestamp {raw_timestamp:?}: {e}")))?;

    state
        .conversations
        .set_flags(&user_id, timestamp, payload.is_liked, payload.is_disliked)
        .await?;

    Ok(Json(MessageResponse {
        message: "Flag updated".to_string(),
    }))
}

pub async fn list_conversations(
    State(state): State<Arc<AppState>>,
    Query(params): Query<UserQuery>,
) -> Result<Json<ConversationsResponse>, ApiError> {
    let user_id = required(params.user_id, "userId")?;

    let turns = state.conversations.list_all(&user_id).await?;
    Ok(Json(ConversationsResponse {
        conversations: turns.into_iter().map(ConversationResponse::from).collect(),
    }))
}

pub async fn research_ai(
    State(state): State<Arc<AppState>>,
    Query(params): Query<UserQuery>,
) -> Result<Json<ChatResponse>, ApiError> {
    let user_id = required(params.user_id, "userId")?;
    let Some(research) = &state.research else {
        return Err(ApiError {
            status: StatusCode::SERVICE_UNAVAILABLE,
            message: "research is not configured".to_string(),
        });
    };

    let reply = research.research(&user_id).await?;
    Ok(Json(reply.into()))
}
