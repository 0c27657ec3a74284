use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VehicleInfo {
    pub make_model: String,
    pub plate: String,
    #[serde(default)]
    pub color: Option<String>,
}

/// Contact/vehicle payload carried on `booking_accepted` so the customer
/// UI can render the driver without a second round trip.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriverProfile {
    pub id: i64,
    pub name: String,
    pub phone: String,
    pub vehicle: VehicleInfo,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriverLocation {
    pub lat: f64,
    pub lng: f64,
    #[serde(default)]
    pub accuracy: Option<f64>,
    #[serde(default)]
    pub heading: Option<f64>,
    #[serde(default)]
    pub speed: Option<f64>,
    pub recorded_at: DateTime<Utc>,
}

/// Continuously overwritten by location pings; never deleted. Going
/// offline flips the flag but keeps the last known location.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriverPresence {
    pub driver_id: i64,
    pub online: bool,
    pub location: Option<DriverLocation>,
    pub updated_at: DateTime<Utc>,
}
