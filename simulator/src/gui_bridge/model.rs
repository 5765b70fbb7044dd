use serde::{Deserialize, Serialize};
use tourcore::interface::PlaybackSignal;
use tourcore::navigation::{NavState, PositionSource};
use tourcore::telemetry::{MetricsSnapshot, Notification};
use tourcore::{LatLng, TourSession};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WaypointView {
    pub name: String,
    pub lat: f64,
    pub lng: f64,
    pub visited: bool,
    pub ready: bool,
    pub nuggets: usize,
}

/// What the bridge serves at `GET /session`.
#[derive(Debug, Clone, Serialize, Default)]
pub struct SessionSnapshot {
    pub tour_id: Option<String>,
    pub tour_name: String,
    pub state: NavState,
    pub mode: PositionSource,
    pub current_index: usize,
    pub position: Option<LatLng>,
    pub waypoints: Vec<WaypointView>,
    pub completed_path: Vec<LatLng>,
    pub remaining_path: Vec<LatLng>,
    pub route_length_m: f64,
    pub can_start: bool,
    pub polling: bool,
    pub playback: PlaybackSignal,
    pub now_playing: Option<String>,
    pub audio_paused: bool,
    pub notifications: Vec<Notification>,
    pub metrics: MetricsSnapshot,
}

impl SessionSnapshot {
    pub fn capture(session: &TourSession) -> Self {
        let navigation = session.navigation();
        let progress = session.progress();
        Self {
            tour_id: session.tour_id().map(str::to_owned),
            tour_name: session.name().to_owned(),
            state: navigation.state(),
            mode: navigation.mode(),
            current_index: navigation.current_index(),
            position: navigation.current_position(),
            waypoints: session
                .waypoints()
                .iter()
                .map(|waypoint| WaypointView {
                    name: waypoint.name.clone(),
                    lat: waypoint.lat,
                    lng: waypoint.lng,
                    visited: waypoint.visited,
                    ready: waypoint.content_complete(),
                    nuggets: waypoint.content.len(),
                })
                .collect(),
            completed_path: progress.completed.clone(),
            remaining_path: progress.remaining.clone(),
            route_length_m: session.route().total_length_m(),
            can_start: session.can_start_tour(),
            polling: session.is_polling(),
            playback: session.playback().clone(),
            now_playing: None,
            audio_paused: false,
            notifications: session.notifier().recent().cloned().collect(),
            metrics: session.metrics().snapshot(),
        }
    }
}
