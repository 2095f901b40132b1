//! Chat injection into a room

use std::sync::Arc;

use axum::{Json, Router, extract::State, http::StatusCode, routing::post};
use serde::{Deserialize, Serialize};

use super::{ApiState, ErrorResponse, error_response};
use crate::room::CHAT_TOPIC;

/// Sender identity used when the caller doesn't name one
pub const DEFAULT_IDENTITY: &str = "API_User";

/// Chat request body
#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub room_name: String,
    pub message: String,
    #[serde(default)]
    pub identity: Option<String>,
}

/// Chat response body
#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub status: &'static str,
    pub message: String,
}

/// Build chat router
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new().route("/chat", post(send_chat)).with_state(state)
}

/// Publish a message on the chat topic as if a participant had typed it
async fn send_chat(
    State(state): State<Arc<ApiState>>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, (StatusCode, Json<ErrorResponse>)> {
    let room = state.hub.get(&request.room_name).await.ok_or_else(|| {
        (
            StatusCode::NOT_FOUND,
            error_response("room_not_found", &format!("no active room named '{}'", request.room_name)),
        )
    })?;

    let identity = request.identity.unwrap_or_else(|| DEFAULT_IDENTITY.to_string());
    let reached = room.inject_data(CHAT_TOPIC, request.message.clone().into_bytes(), Some(identity.clone()));
    tracing::info!(room = %request.room_name, identity = %identity, reached, "chat injected");

    Ok(Json(ChatResponse {
        status: "sent",
        message: request.message,
    }))
}
