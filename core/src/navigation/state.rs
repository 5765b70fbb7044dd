use crate::geo::{distance_meters, LatLng};
use crate::navigation::source::PositionSource;
use crate::prelude::{TourError, TourResult};
use crate::tour::{ContentNugget, Waypoint, WaypointId};
use log::{debug, info};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NavState {
    #[default]
    Idle,
    Navigating,
    Completed,
}

/// Emitted when the active target is reached.
#[derive(Debug, Clone, PartialEq)]
pub struct Arrival {
    pub waypoint_index: usize,
    pub waypoint_id: WaypointId,
    /// Main content audio, when it was ready at arrival time.
    pub audio_path: Option<String>,
    /// The reached waypoint was the last one.
    pub completed: bool,
}

/// Tracks which waypoint is the current target and walks the tour forward,
/// one waypoint per position update.
#[derive(Debug)]
pub struct NavigationSession {
    state: NavState,
    current_index: usize,
    mode: PositionSource,
    current_position: Option<LatLng>,
    active_follow_up: Option<WaypointId>,
    arrival_threshold_m: f64,
}

impl NavigationSession {
    pub fn new(arrival_threshold_m: f64) -> Self {
        Self {
            state: NavState::Idle,
            current_index: 0,
            mode: PositionSource::default(),
            current_position: None,
            active_follow_up: None,
            arrival_threshold_m,
        }
    }

    pub fn state(&self) -> NavState {
        self.state
    }

    pub fn is_navigating(&self) -> bool {
        self.state == NavState::Navigating
    }

    pub fn current_index(&self) -> usize {
        self.current_index
    }

    pub fn mode(&self) -> PositionSource {
        self.mode
    }

    pub fn current_position(&self) -> Option<LatLng> {
        self.current_position
    }

    /// Waypoint whose follow-up questions are currently open.
    pub fn active_follow_up(&self) -> Option<WaypointId> {
        self.active_follow_up
    }

    pub fn target<'a>(&self, waypoints: &'a [Waypoint]) -> Option<&'a Waypoint> {
        if self.is_navigating() {
            waypoints.get(self.current_index)
        } else {
            None
        }
    }

    /// Switches the position source. The last fix came from the old source,
    /// so it is dropped.
    pub fn set_mode(&mut self, mode: PositionSource) {
        if self.mode != mode {
            debug!("position source switched to {:?}", mode);
            self.mode = mode;
            self.current_position = None;
        }
    }

    pub fn start(&mut self, waypoints: &mut [Waypoint]) -> TourResult<()> {
        if waypoints.is_empty() {
            return Err(TourError::InvalidInput(
                "navigation needs at least one waypoint".into(),
            ));
        }
        for waypoint in waypoints.iter_mut() {
            waypoint.visited = false;
        }
        self.current_index = 0;
        self.current_position = None;
        self.active_follow_up = None;
        self.state = NavState::Navigating;
        info!("navigation started over {} waypoints", waypoints.len());
        Ok(())
    }

    /// Single entry point for position fixes, real or simulated.
    ///
    /// Only the current target is checked, so at most one waypoint is marked
    /// visited per call. Fixes inside the radius of an already visited target
    /// change nothing.
    pub fn on_position_update(
        &mut self,
        waypoints: &mut [Waypoint],
        position: LatLng,
    ) -> Option<Arrival> {
        if !self.is_navigating() || !position.is_finite() {
            return None;
        }
        self.current_position = Some(position);

        let index = self.current_index;
        let total = waypoints.len();
        let target = waypoints.get_mut(index)?;
        if target.visited {
            return None;
        }

        let distance = distance_meters(position, target.position());
        if distance >= self.arrival_threshold_m {
            return None;
        }

        target.visited = true;
        let audio_path = target
            .main_content()
            .and_then(ContentNugget::playable_audio)
            .map(str::to_owned);
        let arrival = Arrival {
            waypoint_index: index,
            waypoint_id: target.id,
            audio_path,
            completed: index + 1 >= total,
        };
        info!(
            "arrived at waypoint {} ({}) at {:.1} m",
            index, target.name, distance
        );

        if arrival.completed {
            self.current_index = total;
            self.state = NavState::Completed;
            self.active_follow_up = None;
        } else {
            self.current_index += 1;
            self.active_follow_up = Some(target.id);
        }
        Some(arrival)
    }

    pub fn stop(&mut self) {
        if self.state != NavState::Idle {
            info!("navigation stopped at index {}", self.current_index);
        }
        self.state = NavState::Idle;
        self.active_follow_up = None;
    }
}
