//! Deterministic mapping from entity identity to pub/sub channel name.
//!
//! Pure functions only. Distinct prefixes per entity type keep the
//! namespaces collision-free.

/// Fleet-wide channel every driver client subscribes to. Carries
/// `request_accepted` and `request_rebroadcast` notices.
pub const FLEET_CHANNEL: &str = "fleet_drivers";

/// Fleet-wide location ping channel for fleet-management tooling.
pub const FLEET_LOCATION_CHANNEL: &str = "fleet_locations";

pub fn customer_channel(customer_id: i64) -> String {
    format!("customer_{customer_id}")
}

pub fn driver_channel(driver_id: i64) -> String {
    format!("driver_{driver_id}")
}

pub fn delivery_channel(delivery_id: i64) -> String {
    format!("delivery_{delivery_id}")
}
