use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, post, put};
use axum::Json;
use axum::Router;
use serde::Deserialize;
use serde_json::json;

use crate::channels::customer_channel;
use crate::chat;
use crate::dispatch::engine::{broadcast_request, DispatchTarget};
use crate::error::AppError;
use crate::geo::{haversine_km, GeoPoint};
use crate::models::delivery::{
    DeliveryRequest, DeliveryStatus, NewDeliveryRequest, PackageInfo, RequestStatus,
};
use crate::state::AppState;
use crate::store::DeliveryStore;
use crate::transport::{MessageKind, WireMessage};

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/deliveries", post(create_delivery))
        .route("/deliveries/:id", get(get_delivery))
        .route("/deliveries/:id/status", put(update_delivery_status))
}

#[derive(Deserialize)]
pub struct CreateDeliveryRequest {
    pub customer_id: i64,
    pub pickup: GeoPoint,
    pub pickup_address: String,
    pub dropoff: GeoPoint,
    pub dropoff_address: String,
    pub fare: f64,
    pub distance_km: Option<f64>,
    pub package: PackageInfo,
    pub recipient_phone: String,
    pub assigned_driver_id: Option<i64>,
    pub candidate_driver_ids: Option<Vec<i64>>,
}

async fn create_delivery(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateDeliveryRequest>,
) -> Result<Json<DeliveryRequest>, AppError> {
    payload.pickup.validate()?;
    payload.dropoff.validate()?;

    if payload.fare < 0.0 {
        return Err(AppError::Validation("fare cannot be negative".to_string()));
    }

    if payload.recipient_phone.trim().is_empty() {
        return Err(AppError::Validation(
            "recipient_phone is required".to_string(),
        ));
    }

    let target = match (&payload.assigned_driver_id, &payload.candidate_driver_ids) {
        (Some(driver_id), _) => DispatchTarget::Direct(*driver_id),
        (None, Some(candidates)) => DispatchTarget::Broadcast(candidates.clone()),
        (None, None) => {
            return Err(AppError::Validation(
                "either assigned_driver_id or candidate_driver_ids is required".to_string(),
            ))
        }
    };

    let distance_km = payload
        .distance_km
        .unwrap_or_else(|| haversine_km(&payload.pickup, &payload.dropoff));

    let new = NewDeliveryRequest {
        customer_id: payload.customer_id,
        pickup: payload.pickup,
        pickup_address: payload.pickup_address,
        dropoff: payload.dropoff,
        dropoff_address: payload.dropoff_address,
        fare: payload.fare,
        distance_km,
        package: payload.package,
        recipient_phone: payload.recipient_phone,
    };

    let request = broadcast_request(&state, new, target).await?;
    Ok(Json(request))
}

async fn get_delivery(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<DeliveryRequest>, AppError> {
    let request = state
        .deliveries
        .get(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("delivery {id} not found")))?;

    Ok(Json(request))
}

#[derive(Deserialize)]
pub struct UpdateDeliveryStatusRequest {
    pub status: DeliveryStatus,
    pub driver_id: i64,
}

/// Driver-app-issued physical-progress transition. Validated against the
/// sub-state table, applied with a conditional update, then pushed to the
/// customer and mirrored into the chat log.
async fn update_delivery_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateDeliveryStatusRequest>,
) -> Result<Json<DeliveryRequest>, AppError> {
    let request = state
        .deliveries
        .get(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("delivery {id} not found")))?;

    if request.assigned_driver_id != Some(payload.driver_id) {
        return Err(AppError::Conflict(
            "delivery is not assigned to this driver".to_string(),
        ));
    }

    let current = request.delivery_status.ok_or_else(|| {
        AppError::Conflict("delivery has not been accepted yet".to_string())
    })?;

    if !current.can_transition(payload.status) {
        return Err(AppError::Conflict(format!(
            "cannot move delivery from {current} to {}",
            payload.status
        )));
    }

    let advanced = state
        .deliveries
        .advance_delivery_status(id, current, payload.status)
        .await?;
    if !advanced {
        return Err(AppError::Conflict(
            "delivery status changed concurrently".to_string(),
        ));
    }

    if payload.status == DeliveryStatus::Completed {
        // Booking lifecycle follows the physical progress here.
        let _ = state
            .deliveries
            .set_request_status(id, RequestStatus::Accepted, RequestStatus::Completed)
            .await?;
    }

    let data = json!({
        "delivery_id": id,
        "status": payload.status,
        "driver_id": payload.driver_id,
    });
    state
        .publish_best_effort(
            &customer_channel(request.customer_id),
            WireMessage::new(
                MessageKind::BookingStatusUpdate,
                data,
                Some(payload.driver_id),
            ),
        )
        .await;

    chat::send_status_note(&state, id, payload.driver_id, payload.status.to_string()).await?;

    let updated = state
        .deliveries
        .get(id)
        .await?
        .ok_or_else(|| AppError::Internal(format!("delivery {id} vanished after update")))?;

    Ok(Json(updated))
}
