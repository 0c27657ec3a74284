//! In-process fabric used by the binary and the test suite. Stands in for
//! the hosted pub/sub network with the same per-channel ordering and
//! fan-out semantics.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::mpsc;

use crate::error::AppError;
use crate::transport::{Subscription, SubscriptionId, TransportFabric, WireMessage};

type Sender = mpsc::UnboundedSender<(String, WireMessage)>;

pub struct MemoryFabric {
    topics: DashMap<String, Vec<(SubscriptionId, Sender)>>,
    next_id: AtomicU64,
}

impl MemoryFabric {
    pub fn new() -> Self {
        Self {
            topics: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }
}

impl Default for MemoryFabric {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TransportFabric for MemoryFabric {
    async fn publish(&self, channel: &str, message: WireMessage) -> Result<(), AppError> {
        if let Some(mut subscribers) = self.topics.get_mut(channel) {
            // Closed receivers are dropped lazily on the next publish.
            subscribers
                .retain(|(_, tx)| tx.send((channel.to_string(), message.clone())).is_ok());
        }
        Ok(())
    }

    async fn subscribe(&self, channels: &[String]) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();

        for channel in channels {
            self.topics
                .entry(channel.clone())
                .or_default()
                .push((id, tx.clone()));
        }

        Subscription::new(id, rx)
    }

    async fn unsubscribe(&self, id: SubscriptionId) {
        for mut entry in self.topics.iter_mut() {
            entry.value_mut().retain(|(sub_id, _)| *sub_id != id);
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::MemoryFabric;
    use crate::transport::{MessageKind, TransportFabric, WireMessage};

    #[tokio::test]
    async fn subscriber_receives_only_its_channels() {
        let fabric = MemoryFabric::new();
        let mut sub = fabric.subscribe(&["a".to_string()]).await;

        fabric
            .publish("b", WireMessage::new(MessageKind::ChatMessage, json!({}), None))
            .await
            .unwrap();
        fabric
            .publish(
                "a",
                WireMessage::new(MessageKind::ChatMessage, json!({"n": 1}), None),
            )
            .await
            .unwrap();

        let (channel, message) = sub.recv().await.unwrap();
        assert_eq!(channel, "a");
        assert_eq!(message.data["n"], 1);
        assert!(sub.try_recv().is_none());
    }

    #[tokio::test]
    async fn multiplexed_subscription_tags_the_source_channel() {
        let fabric = MemoryFabric::new();
        let mut sub = fabric
            .subscribe(&["x".to_string(), "y".to_string()])
            .await;

        fabric
            .publish("y", WireMessage::new(MessageKind::BookingRequest, json!({}), None))
            .await
            .unwrap();

        let (channel, _) = sub.recv().await.unwrap();
        assert_eq!(channel, "y");
    }

    #[tokio::test]
    async fn unsubscribe_stops_delivery() {
        let fabric = MemoryFabric::new();
        let mut sub = fabric.subscribe(&["a".to_string()]).await;
        fabric.unsubscribe(sub.id).await;

        fabric
            .publish("a", WireMessage::new(MessageKind::ChatMessage, json!({}), None))
            .await
            .unwrap();

        assert!(sub.try_recv().is_none());
    }
}
