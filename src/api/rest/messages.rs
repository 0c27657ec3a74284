use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use serde::{Deserialize, Serialize};

use crate::chat;
use crate::error::AppError;
use crate::models::chat::{ChatMessage, ChatMessageType, NewChatMessage, SenderType};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/deliveries/:id/messages",
            post(send_message).get(list_messages),
        )
        .route("/deliveries/:id/messages/read", post(mark_read))
}

#[derive(Deserialize)]
pub struct SendMessageRequest {
    pub sender_type: SenderType,
    pub sender_id: i64,
    #[serde(default = "default_message_type")]
    pub message_type: ChatMessageType,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub image_url: Option<String>,
}

fn default_message_type() -> ChatMessageType {
    ChatMessageType::Text
}

async fn send_message(
    State(state): State<Arc<AppState>>,
    Path(delivery_id): Path<i64>,
    Json(payload): Json<SendMessageRequest>,
) -> Result<Json<ChatMessage>, AppError> {
    let message = chat::send_message(
        &state,
        NewChatMessage {
            delivery_id,
            sender_type: payload.sender_type,
            sender_id: payload.sender_id,
            message_type: payload.message_type,
            content: payload.content,
            image_url: payload.image_url,
        },
    )
    .await?;

    Ok(Json(message))
}

async fn list_messages(
    State(state): State<Arc<AppState>>,
    Path(delivery_id): Path<i64>,
) -> Result<Json<Vec<ChatMessage>>, AppError> {
    let messages = chat::list_messages(&state, delivery_id).await?;
    Ok(Json(messages))
}

/// Two modes: `message_id` marks one message; `reader` marks everything
/// unread from the other party. Both are idempotent.
#[derive(Deserialize)]
pub struct MarkReadRequest {
    #[serde(default)]
    pub message_id: Option<i64>,
    #[serde(default)]
    pub reader: Option<SenderType>,
}

#[derive(Serialize)]
pub struct MarkReadResponse {
    pub marked: u64,
}

async fn mark_read(
    State(state): State<Arc<AppState>>,
    Path(delivery_id): Path<i64>,
    Json(payload): Json<MarkReadRequest>,
) -> Result<Json<MarkReadResponse>, AppError> {
    let marked = match (payload.message_id, payload.reader) {
        (Some(message_id), _) => {
            let changed = chat::mark_message_read(&state, message_id).await?;
            u64::from(changed)
        }
        (None, Some(reader)) => chat::mark_conversation_read(&state, delivery_id, reader).await?,
        (None, None) => {
            return Err(AppError::Validation(
                "either message_id or reader is required".to_string(),
            ))
        }
    };

    Ok(Json(MarkReadResponse { marked }))
}
