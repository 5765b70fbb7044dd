pub mod model;
pub mod route;

pub use model::{
    placeholder_name, route_keys, ContentNugget, Tour, TourDraft, TourSummary, Waypoint,
    WaypointDraft, WaypointId, WaypointKey,
};
pub use route::{points_equal, should_recompute, Route, RouteJob};
