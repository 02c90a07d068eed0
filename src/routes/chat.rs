use axum::{extract::State, Json};
use std::sync::Arc;

use crate::app::AppState;
use crate::domain::{ChatMessage, ChatRequest, ChatResponse};
use crate::error::{ApiError, ApiResult};
use crate::services::chat_context::{build_context, ChatScope, ContextLimits};

/// Answer a chat turn, grounded in the deals visible on the caller's page
pub async fn chat(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ChatRequest>,
) -> ApiResult<Json<ChatResponse>> {
    if req.message.trim().is_empty() {
        return Err(ApiError::bad_request("No message provided"));
    }

    let scope = ChatScope::from_request(&req);
    let limits = ContextLimits {
        max_deals: state.settings.chat_context_max_deals,
        max_chars: state.settings.chat_context_max_chars,
    };
    let context = build_context(state.store.as_ref(), scope, limits).await;

    tracing::debug!(?scope, context_len = context.len(), "Chat context assembled");

    let response = state
        .ai_client
        .chat(&req.message, &context, &req.conversation_history)
        .await?;

    Ok(Json(ChatResponse {
        success: true,
        message: ChatMessage::assistant(response.clone(), req.deal_id),
        response,
    }))
}
