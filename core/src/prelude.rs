use serde::{Deserialize, Serialize};
use std::time::Duration;

pub use crate::geo::LatLng;
pub use crate::interface::{DirectionsProvider, TourBackend};
pub use crate::navigation::{NavState, PositionFix, PositionSource};
pub use crate::tour::{ContentNugget, Tour, Waypoint, WaypointId};

/// Tunables shared by the route, navigation and reconciliation layers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NavigationConfig {
    /// Distance under which the active target counts as reached.
    pub arrival_threshold_m: f64,
    pub poll_interval_secs: u64,
    /// Spacing of the samples cached for the decoded route polyline.
    pub resample_interval_m: f64,
    /// Tolerance used when matching backend waypoints to local ones.
    pub match_epsilon_deg: f64,
    pub notification_capacity: usize,
}

impl Default for NavigationConfig {
    fn default() -> Self {
        Self {
            arrival_threshold_m: 30.0,
            poll_interval_secs: 7,
            resample_interval_m: 10.0,
            match_epsilon_deg: 1e-4,
            notification_capacity: 32,
        }
    }
}

impl NavigationConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }
}

/// Common error type for tour operations.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum TourError {
    #[error("directions request failed: {0}")]
    Directions(String),
    #[error("backend call failed: {0}")]
    Backend(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("not ready: {0}")]
    NotReady(String),
    #[error("operation not allowed while navigating")]
    NavigationActive,
    #[error("no tour loaded")]
    NoActiveTour,
}

pub type TourResult<T> = Result<T, TourError>;
