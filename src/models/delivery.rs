use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::geo::GeoPoint;

/// Booking lifecycle of a delivery request. Transitions are enforced
/// through [`RequestStatus::can_transition`]; nothing else in the crate
/// compares status strings.
///
/// `Cancelled` is produced only by the administrative surface that sits
/// outside this core; the dispatch protocol never cancels a request
/// itself but honors the state as terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Pending,
    Accepted,
    Completed,
    Confirmed,
    Expired,
    Cancelled,
}

impl RequestStatus {
    pub fn can_transition(self, next: RequestStatus) -> bool {
        use RequestStatus::*;
        matches!(
            (self, next),
            (Pending, Accepted)
                | (Pending, Expired)
                | (Pending, Cancelled)
                | (Accepted, Completed)
                | (Completed, Confirmed)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Accepted => "accepted",
            RequestStatus::Completed => "completed",
            RequestStatus::Confirmed => "confirmed",
            RequestStatus::Expired => "expired",
            RequestStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Physical-progress sub-state, owned by driver-app events once the
/// booking is accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Accepted,
    EnRoute,
    Arrived,
    Completed,
    AwaitingConfirmation,
    Paid,
}

impl DeliveryStatus {
    pub fn can_transition(self, next: DeliveryStatus) -> bool {
        use DeliveryStatus::*;
        matches!(
            (self, next),
            (Accepted, EnRoute)
                | (EnRoute, Arrived)
                | (Arrived, Completed)
                | (Completed, AwaitingConfirmation)
                | (AwaitingConfirmation, Paid)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DeliveryStatus::Accepted => "accepted",
            DeliveryStatus::EnRoute => "en_route",
            DeliveryStatus::Arrived => "arrived",
            DeliveryStatus::Completed => "completed",
            DeliveryStatus::AwaitingConfirmation => "awaiting_confirmation",
            DeliveryStatus::Paid => "paid",
        }
    }
}

impl fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageInfo {
    pub description: String,
    #[serde(default)]
    pub size: Option<String>,
    #[serde(default)]
    pub weight_kg: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryRequest {
    pub id: i64,
    pub customer_id: i64,
    pub pickup: GeoPoint,
    pub pickup_address: String,
    pub dropoff: GeoPoint,
    pub dropoff_address: String,
    pub fare: f64,
    pub distance_km: f64,
    pub package: PackageInfo,
    pub recipient_phone: String,
    pub status: RequestStatus,
    pub delivery_status: Option<DeliveryStatus>,
    pub assigned_driver_id: Option<i64>,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Everything the caller supplies; the store assigns the id and the
/// dispatch engine fixes `expires_at` at creation.
#[derive(Debug, Clone)]
pub struct NewDeliveryRequest {
    pub customer_id: i64,
    pub pickup: GeoPoint,
    pub pickup_address: String,
    pub dropoff: GeoPoint,
    pub dropoff_address: String,
    pub fare: f64,
    pub distance_km: f64,
    pub package: PackageInfo,
    pub recipient_phone: String,
}
