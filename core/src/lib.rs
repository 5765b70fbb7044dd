//! Navigation and progress core for the walking tour platform.
//!
//! The modules cover the geometry helpers, the route model, live progress
//! tracking, the navigation state machine and reconciliation of
//! backend-generated content into the locally held tour.

pub mod content;
pub mod geo;
pub mod interface;
pub mod navigation;
pub mod prelude;
pub mod session;
pub mod task;
pub mod telemetry;
pub mod tour;

pub use geo::LatLng;
pub use prelude::{NavigationConfig, TourError, TourResult};
pub use session::TourSession;
