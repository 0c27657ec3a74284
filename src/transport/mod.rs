//! Thin abstraction over the hosted pub/sub network.
//!
//! Delivery is at-least-once and unordered across channels; consumers
//! de-duplicate by message id and must not assume arrival order implies
//! causal order.

pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::error::AppError;

/// Wire-level message type vocabulary shared with the client apps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    BookingRequest,
    BookingAccepted,
    BookingRejected,
    DriverLocationUpdate,
    BookingStatusUpdate,
    ChatMessage,
    RequestAccepted,
    RequestRebroadcast,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireMessage {
    /// Unique per publish; consumers key their de-duplication on this.
    pub id: Uuid,
    #[serde(rename = "type")]
    pub kind: MessageKind,
    pub data: serde_json::Value,
    pub timestamp: DateTime<Utc>,
    pub sender_id: Option<i64>,
}

impl WireMessage {
    pub fn new(kind: MessageKind, data: serde_json::Value, sender_id: Option<i64>) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            data,
            timestamp: Utc::now(),
            sender_id,
        }
    }
}

pub type SubscriptionId = u64;

/// A multiplexed subscription over one or more channels. Messages arrive
/// tagged with the channel they were published on.
pub struct Subscription {
    pub id: SubscriptionId,
    rx: mpsc::UnboundedReceiver<(String, WireMessage)>,
}

impl Subscription {
    pub fn new(id: SubscriptionId, rx: mpsc::UnboundedReceiver<(String, WireMessage)>) -> Self {
        Self { id, rx }
    }

    pub async fn recv(&mut self) -> Option<(String, WireMessage)> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<(String, WireMessage)> {
        self.rx.try_recv().ok()
    }
}

#[async_trait]
pub trait TransportFabric: Send + Sync {
    /// Fire-and-forget. An `Err` means the transport did not ack; the
    /// caller logs it and degrades to the polling path.
    async fn publish(&self, channel: &str, message: WireMessage) -> Result<(), AppError>;

    async fn subscribe(&self, channels: &[String]) -> Subscription;

    async fn unsubscribe(&self, id: SubscriptionId);
}
