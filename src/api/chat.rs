use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use serde::Deserialize;

use crate::api::state::AppState;
use crate::db::models::Message;
use crate::error::AppError;
use crate::realtime::DeleteScope;

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub message: String,
}

/// POST /api/chat/send/:receiver_id (requires auth)
pub async fn send_message(
    State(state): State<AppState>,
    Extension(user_id): Extension<String>,
    Path(receiver_id): Path<String>,
    Json(req): Json<SendMessageRequest>,
) -> Result<(StatusCode, Json<Message>), AppError> {
    let message = state.delivery.send(&user_id, &receiver_id, &req.message).await?;
    Ok((StatusCode::CREATED, Json(message)))
}

/// GET /api/chat/messages/:peer_id (requires auth)
///
/// Arrival-ordered history for the conversation with `peer_id`; an empty
/// list when the two users have never exchanged a message.
pub async fn get_messages(
    State(state): State<AppState>,
    Extension(user_id): Extension<String>,
    Path(peer_id): Path<String>,
) -> Result<Json<Vec<Message>>, AppError> {
    let messages = state.delivery.history(&user_id, &peer_id).await?;
    Ok(Json(messages))
}

/// DELETE /api/chat/message/:message_id (requires auth)
///
/// Either participant may delete through this surface.
pub async fn delete_message(
    State(state): State<AppState>,
    Extension(user_id): Extension<String>,
    Path(message_id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    state
        .delivery
        .delete(&user_id, &message_id, DeleteScope::AnyParticipant)
        .await?;

    Ok(Json(serde_json::json!({
        "message": "Message deleted successfully"
    })))
}
