//! Chat handlers.
//!
//! Both endpoints relay the request body to the conversation service
//! unchanged. The caller's identity travels only as the verified subject.

use crate::models::{ChatFeedbackRequest, ChatMessageRequest};
use crate::routes::AppState;
use axum::extract::State;
use axum::{Extension, Json};
use common::auth::IdentityClaims;
use common::error::ApiError;
use serde_json::Value;
use std::sync::Arc;
use tracing::instrument;

/// Handler for POST /v1/chat/message
#[instrument(skip_all, name = "gw.handlers.chat_message")]
pub async fn chat_message(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<IdentityClaims>,
    Json(request): Json<ChatMessageRequest>,
) -> Result<Json<Value>, ApiError> {
    tracing::debug!(
        target: "gw.handlers.chat",
        modality = %request.modality,
        history_len = request.history.len(),
        "Relaying chat message"
    );

    let reply = state.aggregator.chat_message(&request, &claims.sub).await?;
    Ok(Json(reply))
}

/// Handler for POST /v1/chat/feedback
///
/// The reaction value is validated by the conversation service; its 4xx is
/// relayed unchanged.
#[instrument(skip_all, name = "gw.handlers.chat_feedback")]
pub async fn chat_feedback(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<IdentityClaims>,
    Json(request): Json<ChatFeedbackRequest>,
) -> Result<Json<Value>, ApiError> {
    let reply = state.aggregator.chat_feedback(&request, &claims.sub).await?;
    Ok(Json(reply))
}
