use std::sync::Arc;

use chrono::Utc;
use futures::future::join_all;
use tokio::time::Duration;
use tracing::{error, info, warn};

use crate::channels::driver_channel;
use crate::error::AppError;
use crate::models::delivery::{DeliveryRequest, NewDeliveryRequest};
use crate::state::AppState;
use crate::store::DeliveryStore;
use crate::transport::{MessageKind, WireMessage};

#[derive(Debug, Clone)]
pub enum DispatchTarget {
    /// Dispatch to exactly one known driver.
    Direct(i64),
    /// Fan out to every candidate in parallel; no ordering guarantee on
    /// who sees it first.
    Broadcast(Vec<i64>),
}

/// Persists the request with a fixed expiry deadline, then fans it out.
/// Each driver client computes its own countdown from `expires_at`; the
/// arbiter is what actually refuses late responses.
pub async fn broadcast_request(
    state: &AppState,
    new: NewDeliveryRequest,
    target: DispatchTarget,
) -> Result<DeliveryRequest, AppError> {
    let expires_at = Utc::now() + state.request_ttl;
    let request = state.deliveries.insert(new, expires_at).await?;
    state.metrics.pending_requests.inc();

    let data = serde_json::to_value(&request)
        .map_err(|err| AppError::Internal(format!("serialize booking request: {err}")))?;
    let message = WireMessage::new(MessageKind::BookingRequest, data, Some(request.customer_id));

    match &target {
        DispatchTarget::Direct(driver_id) => {
            state.metrics.dispatch_fanout_total.with_label_values(&["direct"]).inc();
            state
                .publish_best_effort(&driver_channel(*driver_id), message)
                .await;
            info!(request_id = request.id, driver_id, "booking request dispatched directly");
        }
        DispatchTarget::Broadcast(candidates) if candidates.is_empty() => {
            // Same state machine as the broadcast case: the request sits
            // Pending until the sweep ages it out.
            warn!(request_id = request.id, "no candidate drivers; request will age out");
        }
        DispatchTarget::Broadcast(candidates) => {
            state.metrics.dispatch_fanout_total.with_label_values(&["broadcast"]).inc();

            let publishes = candidates.iter().map(|driver_id| {
                let channel = driver_channel(*driver_id);
                let message = message.clone();
                async move { state.publish_best_effort(&channel, message).await }
            });
            join_all(publishes).await;

            info!(
                request_id = request.id,
                candidates = candidates.len(),
                "booking request broadcast"
            );
        }
    }

    Ok(request)
}

/// Background sweep transitioning stale Pending rows to Expired. The
/// arbiter's deadline check is the correctness guard; this just keeps the
/// store tidy and the gauge honest.
pub async fn run_expiry_sweep(state: Arc<AppState>, interval: Duration) {
    info!("expiry sweep started");

    loop {
        tokio::time::sleep(interval).await;

        match state.deliveries.expire_stale(Utc::now()).await {
            Ok(expired) => {
                for request_id in expired {
                    state.metrics.pending_requests.dec();
                    state.metrics.expired_requests_total.inc();
                    info!(request_id, "pending request expired");
                }
            }
            Err(err) => error!(error = %err, "expiry sweep failed"),
        }
    }
}
