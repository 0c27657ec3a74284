//! Per-delivery ephemeral messaging bridged to the persisted message log.
//!
//! Both sides of a conversation share the single `delivery_{id}` channel.
//! Display order falls back to `created_at` because transport order is
//! not guaranteed, and consumers de-duplicate by message id.

use crate::channels::delivery_channel;
use crate::error::AppError;
use crate::models::chat::{ChatMessage, ChatMessageType, NewChatMessage, SenderType};
use crate::state::AppState;
use crate::store::{ChatStore, DeliveryStore};
use crate::transport::{MessageKind, WireMessage};

async fn ensure_delivery_exists(state: &AppState, delivery_id: i64) -> Result<(), AppError> {
    state
        .deliveries
        .get(delivery_id)
        .await?
        .map(|_| ())
        .ok_or_else(|| AppError::NotFound(format!("delivery {delivery_id} not found")))
}

/// Persists the message append-only, then publishes it on the delivery
/// channel. The publish is best-effort; the log is the durable copy.
pub async fn send_message(state: &AppState, new: NewChatMessage) -> Result<ChatMessage, AppError> {
    ensure_delivery_exists(state, new.delivery_id).await?;

    if new.content.trim().is_empty() && new.image_url.is_none() {
        return Err(AppError::Validation(
            "message needs content or an image".to_string(),
        ));
    }

    let message = state.chat.append(new).await?;

    let data = serde_json::to_value(&message)
        .map_err(|err| AppError::Internal(format!("serialize chat message: {err}")))?;
    state
        .publish_best_effort(
            &delivery_channel(message.delivery_id),
            WireMessage::new(MessageKind::ChatMessage, data, Some(message.sender_id)),
        )
        .await;

    Ok(message)
}

/// System-originated status note appended to the conversation so it shows
/// up in the chat history alongside the push notification.
pub async fn send_status_note(
    state: &AppState,
    delivery_id: i64,
    sender_id: i64,
    content: String,
) -> Result<ChatMessage, AppError> {
    send_message(
        state,
        NewChatMessage {
            delivery_id,
            sender_type: SenderType::System,
            sender_id,
            message_type: ChatMessageType::StatusUpdate,
            content,
            image_url: None,
        },
    )
    .await
}

pub async fn list_messages(
    state: &AppState,
    delivery_id: i64,
) -> Result<Vec<ChatMessage>, AppError> {
    ensure_delivery_exists(state, delivery_id).await?;
    state.chat.list_for_delivery(delivery_id).await
}

/// Marks a single message; re-marking an already-read message is a no-op.
pub async fn mark_message_read(state: &AppState, message_id: i64) -> Result<bool, AppError> {
    state.chat.mark_read(message_id).await
}

/// Marks everything unread from the other party for this delivery.
pub async fn mark_conversation_read(
    state: &AppState,
    delivery_id: i64,
    reader: SenderType,
) -> Result<u64, AppError> {
    ensure_delivery_exists(state, delivery_id).await?;
    state.chat.mark_all_read(delivery_id, reader).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::chat::{ChatMessageType, SenderType};
    use crate::state::AppState;

    fn state() -> AppState {
        AppState::in_memory(chrono::Duration::seconds(60))
    }

    #[tokio::test]
    async fn message_for_unknown_delivery_is_rejected() {
        let state = state();
        let result = send_message(
            &state,
            NewChatMessage {
                delivery_id: 999,
                sender_type: SenderType::Customer,
                sender_id: 1,
                message_type: ChatMessageType::Text,
                content: "where are you?".to_string(),
                image_url: None,
            },
        )
        .await;

        assert!(matches!(result, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn empty_message_without_image_is_rejected() {
        let state = state();
        let request = crate::dispatch::engine::broadcast_request(
            &state,
            crate::models::delivery::NewDeliveryRequest {
                customer_id: 1,
                pickup: crate::geo::GeoPoint {
                    lat: 0.0,
                    lng: 0.0,
                },
                pickup_address: "a".to_string(),
                dropoff: crate::geo::GeoPoint {
                    lat: 0.1,
                    lng: 0.1,
                },
                dropoff_address: "b".to_string(),
                fare: 5.0,
                distance_km: 1.0,
                package: crate::models::delivery::PackageInfo {
                    description: "box".to_string(),
                    size: None,
                    weight_kg: None,
                },
                recipient_phone: "+263770000000".to_string(),
            },
            crate::dispatch::engine::DispatchTarget::Broadcast(vec![]),
        )
        .await
        .unwrap();

        let result = send_message(
            &state,
            NewChatMessage {
                delivery_id: request.id,
                sender_type: SenderType::Customer,
                sender_id: 1,
                message_type: ChatMessageType::Text,
                content: "   ".to_string(),
                image_url: None,
            },
        )
        .await;

        assert!(matches!(result, Err(AppError::Validation(_))));
    }
}
