use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{patch, post};
use axum::Json;
use axum::Router;
use chrono::Utc;
use serde::Deserialize;

use crate::error::AppError;
use crate::models::driver::{DriverPresence, DriverProfile, VehicleInfo};
use crate::presence::{self, LocationUpdate};
use crate::state::AppState;
use crate::store::DriverStore;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/drivers", post(register_driver))
        .route("/drivers/:id/presence", patch(update_presence))
        .route(
            "/drivers/:id/location",
            patch(update_location).get(last_location),
        )
}

#[derive(Deserialize)]
pub struct RegisterDriverRequest {
    pub id: i64,
    pub name: String,
    pub phone: String,
    pub vehicle: VehicleInfo,
}

async fn register_driver(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<RegisterDriverRequest>,
) -> Result<Json<DriverProfile>, AppError> {
    if payload.name.trim().is_empty() {
        return Err(AppError::Validation("name cannot be empty".to_string()));
    }

    if payload.phone.trim().is_empty() {
        return Err(AppError::Validation("phone cannot be empty".to_string()));
    }

    let profile = DriverProfile {
        id: payload.id,
        name: payload.name,
        phone: payload.phone,
        vehicle: payload.vehicle,
        created_at: Utc::now(),
    };

    state.drivers.insert_profile(profile.clone()).await?;

    // Presence record exists from registration onward; it is only ever
    // overwritten, never deleted.
    state
        .drivers
        .upsert_presence(DriverPresence {
            driver_id: profile.id,
            online: false,
            location: None,
            updated_at: Utc::now(),
        })
        .await?;

    Ok(Json(profile))
}

#[derive(Deserialize)]
pub struct UpdatePresenceRequest {
    pub online: bool,
    #[serde(default)]
    pub location: Option<LocationUpdate>,
}

async fn update_presence(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdatePresenceRequest>,
) -> Result<Json<DriverPresence>, AppError> {
    let updated = presence::set_online(&state, id, payload.online, payload.location).await?;
    Ok(Json(updated))
}

async fn update_location(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(payload): Json<LocationUpdate>,
) -> Result<Json<DriverPresence>, AppError> {
    let updated = presence::update_location(&state, id, payload).await?;
    Ok(Json(updated))
}

async fn last_location(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<DriverPresence>, AppError> {
    let record = presence::last_known(&state, id).await?;
    Ok(Json(record))
}
