use std::sync::Arc;

use axum::extract::{Query, State};
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::dispatch::arbiter::{handle_driver_response, RespondOutcome};
use crate::error::AppError;
use crate::models::delivery::{DeliveryRequest, DeliveryStatus, RequestStatus};
use crate::models::response::ResponseKind;
use crate::state::AppState;
use crate::store::DeliveryStore;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/bookings/respond", post(respond))
        .route("/bookings/status", get(booking_status))
}

#[derive(Deserialize)]
pub struct RespondRequest {
    pub request_id: i64,
    pub driver_id: i64,
    pub response: ResponseKind,
}

#[derive(Serialize)]
pub struct RespondResponse {
    pub outcome: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request: Option<DeliveryRequest>,
}

async fn respond(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<RespondRequest>,
) -> Result<Json<RespondResponse>, AppError> {
    let outcome = handle_driver_response(
        &state,
        payload.request_id,
        payload.driver_id,
        payload.response,
    )
    .await?;

    let response = match outcome {
        RespondOutcome::Assigned(request) => RespondResponse {
            outcome: "assigned",
            request: Some(request),
        },
        RespondOutcome::RejectionRecorded => RespondResponse {
            outcome: "rejection_recorded",
            request: None,
        },
    };

    Ok(Json(response))
}

#[derive(Deserialize)]
pub struct StatusQuery {
    pub request_id: i64,
}

/// Polling fallback for clients whose push channel dropped.
#[derive(Serialize)]
pub struct BookingStatusResponse {
    pub request_id: i64,
    pub status: RequestStatus,
    pub delivery_status: Option<DeliveryStatus>,
    pub assigned_driver_id: Option<i64>,
    pub expires_at: DateTime<Utc>,
    pub expired: bool,
}

async fn booking_status(
    State(state): State<Arc<AppState>>,
    Query(query): Query<StatusQuery>,
) -> Result<Json<BookingStatusResponse>, AppError> {
    let request = state
        .deliveries
        .get(query.request_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("request {} not found", query.request_id)))?;

    // An already-claimed request past its deadline is not "expired"; the
    // deadline only ever cuts off pending negotiations.
    let expired = request.status == RequestStatus::Expired
        || (request.status == RequestStatus::Pending && Utc::now() > request.expires_at);

    Ok(Json(BookingStatusResponse {
        request_id: request.id,
        status: request.status,
        delivery_status: request.delivery_status,
        assigned_driver_id: request.assigned_driver_id,
        expires_at: request.expires_at,
        expired,
    }))
}
