use std::sync::Arc;

use chrono::Duration;
use tracing::warn;

use crate::observability::metrics::Metrics;
use crate::store::memory::MemoryStore;
use crate::store::{ChatStore, DeliveryStore, DriverStore, ResponseStore};
use crate::transport::memory::MemoryFabric;
use crate::transport::{TransportFabric, WireMessage};

pub struct AppState {
    pub deliveries: Arc<dyn DeliveryStore>,
    pub responses: Arc<dyn ResponseStore>,
    pub drivers: Arc<dyn DriverStore>,
    pub chat: Arc<dyn ChatStore>,
    pub fabric: Arc<dyn TransportFabric>,
    pub request_ttl: Duration,
    pub metrics: Metrics,
}

impl AppState {
    /// Wires the in-memory store and fabric. Production deployments swap
    /// these for the hosted store/pub-sub behind the same traits.
    pub fn in_memory(request_ttl: Duration) -> Self {
        let store = Arc::new(MemoryStore::new());

        Self {
            deliveries: store.clone(),
            responses: store.clone(),
            drivers: store.clone(),
            chat: store,
            fabric: Arc::new(MemoryFabric::new()),
            request_ttl,
            metrics: Metrics::new(),
        }
    }

    /// Push is a convenience layer over the polling endpoints, so a failed
    /// publish is logged and counted, never propagated.
    pub async fn publish_best_effort(&self, channel: &str, message: WireMessage) {
        if let Err(err) = self.fabric.publish(channel, message).await {
            self.metrics
                .publish_failures_total
                .with_label_values(&[channel_kind(channel)])
                .inc();
            warn!(channel, error = %err, "publish failed; clients fall back to polling");
        }
    }
}

fn channel_kind(channel: &str) -> &str {
    channel.rsplit_once('_').map_or(channel, |(kind, _)| kind)
}
