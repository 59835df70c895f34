// src/location.rs
use crate::{
    error::ApiError,
    geo::{self, CoordError, GeoPoint},
    registry::LocationRegistry,
    types::{Envelope, VerifyLocationReq},
};
use serde_json::Value;
use tracing::info;

/// Outcome of a location check that got as far as computing a distance.
#[derive(Debug, Clone, PartialEq)]
pub struct LocationVerdict {
    pub distance_meters: f64,
    pub within_radius: bool,
}

impl LocationVerdict {
    pub fn into_envelope(self) -> Envelope {
        let d = self.distance_meters;
        if self.within_radius {
            Envelope::success(format!("Location verified. You are {d:.2} meters from the class."))
        } else {
            Envelope::failure(format!("Attendance denied. You are {d:.2} meters away."))
        }
    }
}

pub fn verify_location(
    registry: &LocationRegistry,
    radius_meters: f64,
    req: &VerifyLocationReq,
) -> Result<LocationVerdict, ApiError> {
    let missing = || ApiError::Validation("Missing required location data.".into());

    // blank ids count as missing; lookup itself is exact
    let class_id = req
        .class_id
        .as_deref()
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(missing)?;
    let lat = req.latitude.as_ref().filter(|v| is_present(v)).ok_or_else(missing)?;
    let lon = req.longitude.as_ref().filter(|v| is_present(v)).ok_or_else(missing)?;

    let class = registry
        .get(class_id)
        .ok_or_else(|| ApiError::NotFound(class_id.to_string()))?;

    let (lat, lon) = match (parse_degrees(lat), parse_degrees(lon)) {
        (Some(lat), Some(lon)) => (lat, lon),
        _ => return Err(ApiError::Validation("Latitude and longitude must be numbers.".into())),
    };
    let user = GeoPoint::validated(lat, lon).map_err(|e| {
        ApiError::Validation(
            match e {
                CoordError::NotFinite => "Latitude and longitude must be finite numbers.",
                CoordError::LatitudeOutOfRange => "Latitude must be between -90 and 90.",
                CoordError::LongitudeOutOfRange => "Longitude must be between -180 and 180.",
            }
            .into(),
        )
    })?;

    let distance_meters = geo::haversine_meters(class.location, user);
    let within_radius = geo::within_radius(distance_meters, radius_meters);
    if within_radius {
        info!("SUCCESS: location verified for '{class_id}'. Distance: {distance_meters:.2}m");
    } else {
        info!("FAILURE: user too far for '{class_id}'. Distance: {distance_meters:.2}m");
    }

    Ok(LocationVerdict {
        distance_meters,
        within_radius,
    })
}

fn is_present(v: &Value) -> bool {
    match v {
        Value::Null => false,
        Value::String(s) => !s.trim().is_empty(),
        _ => true,
    }
}

fn parse_degrees(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
