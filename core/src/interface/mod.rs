//! Collaborators consumed by the core: the directions provider, the tour
//! backend and the audio sink.

pub mod audio;
pub mod backend;
pub mod directions;

pub use audio::{AudioSink, PlaybackSignal};
pub use backend::{parse_tour, parse_tour_list, FollowUpReceipt, TourBackend};
pub use directions::{
    DirectionsProvider, DirectionsRequest, DirectionsResponse, RouteLeg, TravelMode, STATUS_OK,
};
