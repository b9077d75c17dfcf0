//! Plain HTTP handlers: service description, liveness and the chat echo.

use crate::AppState;
use aria_types::SERVICE_NAME;
use axum::extract::{Extension, Json};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;

/// Conversation id returned when the client did not supply one.
const PLACEHOLDER_CONVERSATION_ID: &str = "temp-conversation-id";

/// Request body for `POST /chat`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub message: String,
    pub user_id: String,
    pub household_id: String,
    #[serde(default)]
    pub conversation_id: Option<String>,
}

/// Response body for `POST /chat`.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatResponse {
    pub response: String,
    pub conversation_id: String,
    /// Always `null`; tool execution is not offered.
    pub tool_calls: Option<Vec<Value>>,
}

/// Handler for `GET /`.
pub async fn root_handler() -> Json<Value> {
    Json(json!({
        "service": SERVICE_NAME,
        "status": "running",
        "endpoints": {
            "health": "/health",
            "chat": "/chat",
            "voiceStream": "/voice/stream",
            "testTts": "/voice/test-tts",
        }
    }))
}

/// Handler for `GET /health`.
pub async fn health_handler(Extension(state): Extension<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": SERVICE_NAME,
        "version": env!("CARGO_PKG_VERSION"),
        "activeConnections": state.registry.len().await,
    }))
}

/// Handler for `POST /chat`.
///
/// Echoes the message back; the language model is only reachable over the
/// voice stream.
pub async fn chat_handler(Json(request): Json<ChatRequest>) -> Json<ChatResponse> {
    tracing::debug!(
        user_id = %request.user_id,
        household_id = %request.household_id,
        "chat echo"
    );
    Json(ChatResponse {
        response: format!("Echo: {} (LLM integration pending)", request.message),
        conversation_id: request
            .conversation_id
            .unwrap_or_else(|| PLACEHOLDER_CONVERSATION_ID.to_string()),
        tool_calls: None,
    })
}
