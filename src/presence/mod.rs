//! Driver online/offline tracking and the live location stream.
//!
//! The presence row is the durable source of truth; every publish here is
//! a best-effort convenience on top of the `GET` poll fallback.

use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use tracing::warn;

use crate::channels::{customer_channel, FLEET_LOCATION_CHANNEL};
use crate::error::AppError;
use crate::geo::GeoPoint;
use crate::models::driver::{DriverLocation, DriverPresence};
use crate::state::AppState;
use crate::store::{DeliveryStore, DriverStore};
use crate::transport::{MessageKind, WireMessage};

#[derive(Debug, Clone, Deserialize)]
pub struct LocationUpdate {
    pub lat: f64,
    pub lng: f64,
    #[serde(default)]
    pub accuracy: Option<f64>,
    #[serde(default)]
    pub heading: Option<f64>,
    #[serde(default)]
    pub speed: Option<f64>,
}

impl LocationUpdate {
    fn into_location(self) -> Result<DriverLocation, AppError> {
        GeoPoint {
            lat: self.lat,
            lng: self.lng,
        }
        .validate()?;

        Ok(DriverLocation {
            lat: self.lat,
            lng: self.lng,
            accuracy: self.accuracy,
            heading: self.heading,
            speed: self.speed,
            recorded_at: Utc::now(),
        })
    }
}

/// Flips the online flag. Going offline keeps the last known location;
/// coming online announces on the fleet channel only when the caller
/// supplied fresh coordinates, never a replay of the stale last-known
/// location.
pub async fn set_online(
    state: &AppState,
    driver_id: i64,
    online: bool,
    coords: Option<LocationUpdate>,
) -> Result<DriverPresence, AppError> {
    let fresh = match coords {
        Some(update) => Some(update.into_location()?),
        None => None,
    };

    let location = match fresh.clone() {
        Some(location) => Some(location),
        None => state
            .drivers
            .presence(driver_id)
            .await?
            .and_then(|p| p.location),
    };

    let presence = DriverPresence {
        driver_id,
        online,
        location,
        updated_at: Utc::now(),
    };
    state.drivers.upsert_presence(presence.clone()).await?;

    if online {
        if let Some(location) = &fresh {
            let data = json!({ "driver_id": driver_id, "location": location });
            state
                .publish_best_effort(
                    FLEET_LOCATION_CHANNEL,
                    WireMessage::new(MessageKind::DriverLocationUpdate, data, Some(driver_id)),
                )
                .await;
        }
    }

    Ok(presence)
}

/// Validates and persists a ping, then dual-publishes: the fleet channel
/// always, and the matched customer's channel when the driver has an
/// active accepted delivery. Publishing never blocks the write.
pub async fn update_location(
    state: &AppState,
    driver_id: i64,
    update: LocationUpdate,
) -> Result<DriverPresence, AppError> {
    let location = update.into_location()?;

    let presence = DriverPresence {
        driver_id,
        online: true,
        location: Some(location.clone()),
        updated_at: Utc::now(),
    };
    state.drivers.upsert_presence(presence.clone()).await?;

    let data = json!({ "driver_id": driver_id, "location": location });
    state
        .publish_best_effort(
            FLEET_LOCATION_CHANNEL,
            WireMessage::new(MessageKind::DriverLocationUpdate, data, Some(driver_id)),
        )
        .await;

    match state.deliveries.active_delivery_for_driver(driver_id).await {
        Ok(Some(active)) => {
            let scoped = json!({
                "driver_id": driver_id,
                "delivery_id": active.id,
                "location": location,
            });
            state
                .publish_best_effort(
                    &customer_channel(active.customer_id),
                    WireMessage::new(MessageKind::DriverLocationUpdate, scoped, Some(driver_id)),
                )
                .await;
        }
        Ok(None) => {}
        // The ping is already persisted; a lookup failure only costs the
        // scoped push.
        Err(err) => warn!(driver_id, error = %err, "active delivery lookup failed"),
    }

    Ok(presence)
}

/// Poll fallback for clients whose push channel dropped.
pub async fn last_known(state: &AppState, driver_id: i64) -> Result<DriverPresence, AppError> {
    state
        .drivers
        .presence(driver_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("driver {driver_id} has no presence record")))
}
