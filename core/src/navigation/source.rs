use crate::geo::LatLng;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Where position fixes come from. Exactly one source is selected at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionSource {
    #[default]
    RealGeolocation,
    SimulatedClick,
}

/// A single position fix tagged with its source.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PositionFix {
    pub source: PositionSource,
    pub position: LatLng,
}

impl PositionFix {
    pub fn new(source: PositionSource, lat: f64, lng: f64) -> Self {
        Self {
            source,
            position: LatLng::new(lat, lng),
        }
    }

    /// Reads a fix from a loosely typed payload. Accepts `lat`/`lng` or
    /// `latitude`/`longitude`, as numbers or numeric strings; anything else
    /// yields `None`.
    pub fn from_json(value: &Value, source: PositionSource) -> Option<Self> {
        let lat = coerce(value.get("lat").or_else(|| value.get("latitude")))?;
        let lng = coerce(value.get("lng").or_else(|| value.get("longitude")))?;
        Some(Self::new(source, lat, lng))
    }
}

fn coerce(field: Option<&Value>) -> Option<f64> {
    let number = match field? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    number.is_finite().then_some(number)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn reads_short_and_long_field_names() {
        let short = PositionFix::from_json(&json!({"lat": 1.5, "lng": 2.5}), PositionSource::SimulatedClick)
            .unwrap();
        assert_eq!(short.position, LatLng::new(1.5, 2.5));

        let long = PositionFix::from_json(
            &json!({"latitude": "3.25", "longitude": 4}),
            PositionSource::RealGeolocation,
        )
        .unwrap();
        assert_eq!(long.position, LatLng::new(3.25, 4.0));
        assert_eq!(long.source, PositionSource::RealGeolocation);
    }

    #[test]
    fn missing_or_mistyped_fields_yield_nothing() {
        let source = PositionSource::SimulatedClick;
        assert!(PositionFix::from_json(&json!({"lat": 1.0}), source).is_none());
        assert!(PositionFix::from_json(&json!({"lat": "north", "lng": 1.0}), source).is_none());
        assert!(PositionFix::from_json(&json!({"lat": null, "lng": 1.0}), source).is_none());
        assert!(PositionFix::from_json(&json!([1.0, 2.0]), source).is_none());
        assert!(PositionFix::from_json(&json!({"lat": "NaN", "lng": 1.0}), source).is_none());
    }
}
