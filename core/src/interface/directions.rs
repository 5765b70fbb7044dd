use crate::geo::LatLng;
use crate::prelude::TourResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub const STATUS_OK: &str = "OK";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TravelMode {
    Walking,
    Driving,
}

/// Route request: fixed origin and destination with optional stopovers that
/// the provider may reorder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectionsRequest {
    pub origin: LatLng,
    pub destination: LatLng,
    pub intermediates: Vec<LatLng>,
    pub optimize: bool,
    pub travel_mode: TravelMode,
}

impl DirectionsRequest {
    /// Builds a walking request through `points`. Needs at least two points.
    pub fn walking(points: &[LatLng]) -> Option<Self> {
        let (origin, rest) = points.split_first()?;
        let (destination, intermediates) = rest.split_last()?;
        Some(Self {
            origin: *origin,
            destination: *destination,
            intermediates: intermediates.to_vec(),
            optimize: true,
            travel_mode: TravelMode::Walking,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RouteLeg {
    pub distance_m: f64,
    pub duration_s: f64,
}

/// What the core consumes from a directions response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectionsResponse {
    pub status: String,
    /// Visiting order of the intermediates, as indices into
    /// `DirectionsRequest::intermediates`.
    #[serde(default)]
    pub waypoint_order: Vec<usize>,
    #[serde(default)]
    pub overview_polyline: String,
    #[serde(default)]
    pub legs: Vec<RouteLeg>,
}

impl DirectionsResponse {
    pub fn failed(status: impl Into<String>) -> Self {
        Self {
            status: status.into(),
            waypoint_order: Vec::new(),
            overview_polyline: String::new(),
            legs: Vec::new(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == STATUS_OK
    }
}

/// Routing service used to optimize the visiting order and draw the path.
///
/// Transport failures are reported as `Err`; a provider that answered with a
/// non-OK status returns `Ok` with that status.
#[async_trait]
pub trait DirectionsProvider: Send + Sync {
    async fn route(&self, request: DirectionsRequest) -> TourResult<DirectionsResponse>;
}
