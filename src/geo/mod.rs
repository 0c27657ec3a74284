use serde::{Deserialize, Serialize};

use crate::error::AppError;

const EARTH_RADIUS_KM: f64 = 6_371.0;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    /// Bounds are inclusive: exactly 90/-90 and 180/-180 are valid.
    pub fn validate(&self) -> Result<(), AppError> {
        if !self.lat.is_finite() || !self.lng.is_finite() {
            return Err(AppError::Validation(
                "coordinates must be finite numbers".to_string(),
            ));
        }

        if self.lat < -90.0 || self.lat > 90.0 {
            return Err(AppError::Validation(format!(
                "latitude {} out of range [-90, 90]",
                self.lat
            )));
        }

        if self.lng < -180.0 || self.lng > 180.0 {
            return Err(AppError::Validation(format!(
                "longitude {} out of range [-180, 180]",
                self.lng
            )));
        }

        Ok(())
    }
}

pub fn haversine_km(a: &GeoPoint, b: &GeoPoint) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let delta_lat = (b.lat - a.lat).to_radians();
    let delta_lng = (b.lng - a.lng).to_radians();

    let sin_lat = (delta_lat / 2.0).sin();
    let sin_lng = (delta_lng / 2.0).sin();

    let haversine = sin_lat * sin_lat + lat1.cos() * lat2.cos() * sin_lng * sin_lng;
    let central_angle = 2.0 * haversine.sqrt().asin();

    EARTH_RADIUS_KM * central_angle
}
