use chrono::Utc;
use serde_json::json;
use tracing::info;

use crate::channels::{customer_channel, FLEET_CHANNEL};
use crate::error::AppError;
use crate::models::delivery::{DeliveryRequest, RequestStatus};
use crate::models::response::{DriverResponse, ResponseKind};
use crate::state::AppState;
use crate::store::{DeliveryStore, DriverStore, ResponseStore};
use crate::transport::{MessageKind, WireMessage};

#[derive(Debug)]
pub enum RespondOutcome {
    /// The claim won; the request is now assigned to this driver.
    Assigned(DeliveryRequest),
    /// Rejection recorded, no request mutation.
    RejectionRecorded,
}

/// Arbitrates one driver's reply to one request.
///
/// The conditional update in [`crate::store::DeliveryStore::claim`] is the
/// sole guard against double assignment; everything before it is
/// fail-fast courtesy. Responses are recorded for history whenever the
/// request exists, whatever the outcome.
pub async fn handle_driver_response(
    state: &AppState,
    request_id: i64,
    driver_id: i64,
    kind: ResponseKind,
) -> Result<RespondOutcome, AppError> {
    let request = state
        .deliveries
        .get(request_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("request {request_id} not found")))?;

    let recorded = state
        .responses
        .record(DriverResponse {
            request_id,
            driver_id,
            kind,
            responded_at: Utc::now(),
        })
        .await?;
    if recorded {
        state
            .metrics
            .responses_total
            .with_label_values(&[kind.as_str()])
            .inc();
    }

    // Expired is distinct from "someone else won" so the driver UI can
    // show the right reason.
    if request.status == RequestStatus::Expired || Utc::now() > request.expires_at {
        return Err(AppError::Conflict("request has expired".to_string()));
    }

    match kind {
        ResponseKind::Rejected => {
            if request.status == RequestStatus::Pending {
                // Best-effort re-offer hook, not a guaranteed re-dispatch.
                let data = json!({
                    "request_id": request_id,
                    "rejected_by": driver_id,
                });
                state
                    .publish_best_effort(
                        FLEET_CHANNEL,
                        WireMessage::new(MessageKind::RequestRebroadcast, data, Some(driver_id)),
                    )
                    .await;

                let notice = json!({ "request_id": request_id, "driver_id": driver_id });
                state
                    .publish_best_effort(
                        &customer_channel(request.customer_id),
                        WireMessage::new(MessageKind::BookingRejected, notice, Some(driver_id)),
                    )
                    .await;
            }

            // A rejection after someone else accepted is a recorded no-op.
            Ok(RespondOutcome::RejectionRecorded)
        }
        ResponseKind::Accepted => {
            if request.status != RequestStatus::Pending {
                state.metrics.claims_total.with_label_values(&["lost"]).inc();
                return Err(AppError::Conflict(
                    "request already accepted by another driver".to_string(),
                ));
            }

            let won = state.deliveries.claim(request_id, driver_id).await?;
            if !won {
                state.metrics.claims_total.with_label_values(&["lost"]).inc();
                return Err(AppError::Conflict(
                    "request already accepted by another driver".to_string(),
                ));
            }

            state.metrics.claims_total.with_label_values(&["won"]).inc();
            state.metrics.pending_requests.dec();

            let assigned = state
                .deliveries
                .get(request_id)
                .await?
                .ok_or_else(|| {
                    AppError::Internal(format!("request {request_id} vanished after claim"))
                })?;

            let driver = state.drivers.profile(driver_id).await?;
            let accepted = json!({
                "request": assigned,
                "driver": driver,
            });
            state
                .publish_best_effort(
                    &customer_channel(assigned.customer_id),
                    WireMessage::new(MessageKind::BookingAccepted, accepted, Some(driver_id)),
                )
                .await;

            // Closes the other candidates' local countdowns.
            let closed = json!({ "request_id": request_id, "driver_id": driver_id });
            state
                .publish_best_effort(
                    FLEET_CHANNEL,
                    WireMessage::new(MessageKind::RequestAccepted, closed, Some(driver_id)),
                )
                .await;

            info!(request_id, driver_id, "booking claimed");
            Ok(RespondOutcome::Assigned(assigned))
        }
    }
}
