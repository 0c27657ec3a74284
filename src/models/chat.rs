use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SenderType {
    Driver,
    Customer,
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatMessageType {
    Text,
    Image,
    StatusUpdate,
    Location,
}

/// Append-only, scoped strictly to one delivery. Only `is_read` is ever
/// mutated after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: i64,
    pub delivery_id: i64,
    pub sender_type: SenderType,
    pub sender_id: i64,
    pub message_type: ChatMessageType,
    pub content: String,
    pub image_url: Option<String>,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewChatMessage {
    pub delivery_id: i64,
    pub sender_type: SenderType,
    pub sender_id: i64,
    pub message_type: ChatMessageType,
    pub content: String,
    pub image_url: Option<String>,
}
