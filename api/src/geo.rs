//! Great-circle helpers for proximity search.
//!
//! Nearby queries run in two passes: a cheap latitude range scan derived from
//! [`BoundingBox::around`], then an exact [`haversine_km`] check that drops the
//! corners the box over-includes.

use urbalert_shared::Location;

pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Flat-earth rectangle enclosing a circle on the sphere, in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub north: f64,
    pub south: f64,
    pub east: f64,
    pub west: f64,
}

impl BoundingBox {
    pub fn around(center: Location, radius_km: f64) -> Self {
        let lat = center.latitude.to_radians();
        let lon = center.longitude.to_radians();
        let d = radius_km / EARTH_RADIUS_KM;
        let d_lon = d / lat.cos();

        Self {
            north: (lat + d).to_degrees(),
            south: (lat - d).to_degrees(),
            east: (lon + d_lon).to_degrees(),
            west: (lon - d_lon).to_degrees(),
        }
    }
}

pub fn haversine_km(a: Location, b: Location) -> f64 {
    let d_lat = (b.latitude - a.latitude).to_radians();
    let d_lon = (b.longitude - a.longitude).to_radians();

    let h = (d_lat / 2.0).sin().powi(2)
        + a.latitude.to_radians().cos() * b.latitude.to_radians().cos() * (d_lon / 2.0).sin().powi(2);

    2.0 * EARTH_RADIUS_KM * h.sqrt().atan2((1.0 - h).sqrt())
}

pub fn validate_location(location: Location) -> Result<(), String> {
    let Location { latitude, longitude } = location;

    if !latitude.is_finite() || !(-90.0..=90.0).contains(&latitude) {
        return Err(format!("Latitude must be between -90 and 90, got {latitude}"));
    }
    if !longitude.is_finite() || !(-180.0..=180.0).contains(&longitude) {
        return Err(format!("Longitude must be between -180 and 180, got {longitude}"));
    }

    Ok(())
}
