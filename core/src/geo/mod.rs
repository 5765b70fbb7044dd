pub mod distance;
pub mod path;
pub mod polyline;

pub use distance::{distance_meters, path_length_meters, EARTH_RADIUS_M};
pub use path::{project_onto_segment, resample, SegmentProjection};
pub use polyline::PolylineCodec;

use serde::{Deserialize, Serialize};

/// A WGS84 coordinate in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

impl LatLng {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    pub fn is_finite(&self) -> bool {
        self.lat.is_finite() && self.lng.is_finite()
    }

    /// Linear interpolation in degree space.
    pub fn lerp(self, other: Self, t: f64) -> Self {
        Self {
            lat: self.lat + (other.lat - self.lat) * t,
            lng: self.lng + (other.lng - self.lng) * t,
        }
    }
}
