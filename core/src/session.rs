//! The tour workspace: waypoints, cached route, navigation state and the
//! background tasks that feed them.
//!
//! All mutation happens through `&mut TourSession` from a single driver
//! task. Async work (directions, backend writes) is split into a `begin_*`
//! call that snapshots what is needed and a `finish_*` call that applies the
//! result, so the session itself never awaits.

use crate::content::{
    append_follow_up, merge_remote, needs_polling, spawn_content_poller, FollowUpRequest,
    PollOutcome,
};
use crate::interface::{DirectionsResponse, FollowUpReceipt, PlaybackSignal, TourBackend};
use crate::navigation::{
    split_progress, Arrival, NavState, NavigationSession, PositionFix, PositionSource,
    ProgressSplit, ProgressTracker,
};
use crate::prelude::{NavigationConfig, TourError, TourResult};
use crate::task::ScopedTask;
use crate::telemetry::{MetricsRecorder, Notifier};
use crate::tour::{
    placeholder_name, Route, RouteJob, Tour, TourDraft, Waypoint, WaypointDraft, WaypointId,
};
use log::{debug, info, warn};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;

/// A tour write handed out by [`TourSession::begin_submission`].
#[derive(Debug, Clone)]
pub struct Submission {
    epoch: u64,
    pub draft: TourDraft,
}

pub struct TourSession {
    config: NavigationConfig,
    tour_id: Option<String>,
    name: String,
    guide_personality: String,
    user_preferences: String,
    waypoints: Vec<Waypoint>,
    route: Route,
    navigation: NavigationSession,
    progress: ProgressTracker,
    split: ProgressSplit,
    playback: PlaybackSignal,
    pending_question: String,
    submitting: bool,
    // bumped on teardown; results tagged with an older epoch are dropped
    epoch: u64,
    poll_generation: u64,
    poller: Option<ScopedTask>,
    position_watch: Option<ScopedTask>,
    notifier: Notifier,
    metrics: MetricsRecorder,
}

impl TourSession {
    pub fn new(config: NavigationConfig) -> Self {
        Self {
            navigation: NavigationSession::new(config.arrival_threshold_m),
            progress: ProgressTracker::new(config.arrival_threshold_m),
            notifier: Notifier::with_capacity(config.notification_capacity),
            config,
            tour_id: None,
            name: String::new(),
            guide_personality: String::new(),
            user_preferences: String::new(),
            waypoints: Vec::new(),
            route: Route::new(),
            split: ProgressSplit::default(),
            playback: PlaybackSignal::default(),
            pending_question: String::new(),
            submitting: false,
            epoch: 0,
            poll_generation: 0,
            poller: None,
            position_watch: None,
            metrics: MetricsRecorder::new(),
        }
    }

    pub fn config(&self) -> &NavigationConfig {
        &self.config
    }

    pub fn tour_id(&self) -> Option<&str> {
        self.tour_id.as_deref()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn waypoints(&self) -> &[Waypoint] {
        &self.waypoints
    }

    pub fn route(&self) -> &Route {
        &self.route
    }

    pub fn navigation(&self) -> &NavigationSession {
        &self.navigation
    }

    /// Completed/remaining split of the route for the latest fix.
    pub fn progress(&self) -> &ProgressSplit {
        &self.split
    }

    pub fn playback(&self) -> &PlaybackSignal {
        &self.playback
    }

    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    pub fn notifier_mut(&mut self) -> &mut Notifier {
        &mut self.notifier
    }

    pub fn metrics(&self) -> &MetricsRecorder {
        &self.metrics
    }

    pub fn is_submitting(&self) -> bool {
        self.submitting
    }

    pub fn pending_question(&self) -> &str {
        &self.pending_question
    }

    pub fn set_details(
        &mut self,
        name: impl Into<String>,
        guide_personality: impl Into<String>,
        user_preferences: impl Into<String>,
    ) {
        self.name = name.into();
        self.guide_personality = guide_personality.into();
        self.user_preferences = user_preferences.into();
    }

    fn ensure_editable(&self) -> TourResult<()> {
        if self.navigation.is_navigating() {
            Err(TourError::NavigationActive)
        } else {
            Ok(())
        }
    }

    fn checked_index(&self, index: usize) -> TourResult<usize> {
        if index < self.waypoints.len() {
            Ok(index)
        } else {
            Err(TourError::InvalidInput(format!(
                "waypoint index {} out of range ({} waypoints)",
                index,
                self.waypoints.len()
            )))
        }
    }

    /// Adds a point at the end of the tour. A missing or blank name, as left
    /// by a failed place lookup, becomes a coordinate label.
    pub fn add_point(&mut self, lat: f64, lng: f64, name: Option<&str>) -> TourResult<WaypointId> {
        self.ensure_editable()?;
        validate_coordinates(lat, lng)?;
        let name = name
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_owned)
            .unwrap_or_else(|| placeholder_name(lat, lng));
        let waypoint = Waypoint::new(name, lat, lng);
        let id = waypoint.id;
        debug!("added waypoint {} at ({:.5}, {:.5})", waypoint.name, lat, lng);
        self.waypoints.push(waypoint);
        self.route.sync_with(&self.waypoints);
        Ok(id)
    }

    /// Marker drag: moves an existing point.
    pub fn move_point(&mut self, index: usize, lat: f64, lng: f64) -> TourResult<()> {
        self.ensure_editable()?;
        validate_coordinates(lat, lng)?;
        let index = self.checked_index(index)?;
        let waypoint = &mut self.waypoints[index];
        waypoint.lat = lat;
        waypoint.lng = lng;
        Ok(())
    }

    /// List drag: moves the waypoint at `from` so it ends up at `to`.
    pub fn move_waypoint(&mut self, from: usize, to: usize) -> TourResult<()> {
        self.ensure_editable()?;
        let from = self.checked_index(from)?;
        let to = self.checked_index(to)?;
        let waypoint = self.waypoints.remove(from);
        self.waypoints.insert(to, waypoint);
        Ok(())
    }

    pub fn remove_point(&mut self, index: usize) -> TourResult<Waypoint> {
        self.ensure_editable()?;
        let index = self.checked_index(index)?;
        let removed = self.waypoints.remove(index);
        self.route.sync_with(&self.waypoints);
        Ok(removed)
    }

    /// Cancels background work and drops navigation state. Results of work
    /// started before this call are ignored when they arrive.
    fn teardown(&mut self) {
        self.navigation.stop();
        self.position_watch = None;
        self.poller = None;
        self.pending_question.clear();
        self.submitting = false;
        self.epoch += 1;
        self.progress.reset();
        self.route.clear();
    }

    /// Empties the workspace and forgets the loaded tour.
    pub fn clear(&mut self) {
        self.teardown();
        self.waypoints.clear();
        self.tour_id = None;
        self.name.clear();
        self.guide_personality.clear();
        self.user_preferences.clear();
        self.refresh_progress();
        info!("workspace cleared");
    }

    /// Replaces the workspace with a tour fetched from the backend.
    pub fn load_tour(&mut self, tour: Tour) {
        self.teardown();
        info!("loaded tour {} ({} waypoints)", tour.id, tour.waypoints.len());
        self.tour_id = Some(tour.id);
        self.name = tour.name;
        self.guide_personality = tour.guide_personality;
        self.user_preferences = tour.user_preferences;
        self.waypoints = tour.waypoints;
        for waypoint in self.waypoints.iter_mut() {
            waypoint.visited = false;
        }
        self.refresh_progress();
    }

    pub fn draft(&self) -> TourDraft {
        TourDraft {
            tour_name: self.name.clone(),
            tour_guide_personality: self.guide_personality.clone(),
            user_preferences: self.user_preferences.clone(),
            points: self.waypoints.iter().map(WaypointDraft::from).collect(),
        }
    }

    // --- route ---

    /// Starts a route computation when the waypoint ordering changed since
    /// the last one. Never starts one while navigating or while another is
    /// running.
    pub fn begin_route(&mut self) -> Option<RouteJob> {
        self.route
            .begin(&self.waypoints, self.navigation.is_navigating())
    }

    pub fn finish_route(
        &mut self,
        job: RouteJob,
        outcome: TourResult<DirectionsResponse>,
    ) -> TourResult<()> {
        let result = self.route.complete(
            job,
            outcome,
            &mut self.waypoints,
            self.config.resample_interval_m,
        );
        self.metrics.record_route(result.is_ok());
        if let Err(err) = &result {
            self.notifier
                .error(format!("Could not calculate route: {}", err));
        }
        self.refresh_progress();
        result
    }

    // --- navigation ---

    /// Why the tour cannot be started right now, if anything.
    pub fn start_blocker(&self) -> Option<String> {
        if self.waypoints.is_empty() {
            return Some("the tour has no waypoints".into());
        }
        if self.submitting {
            return Some("the tour is being saved".into());
        }
        if self.route.is_calculating() {
            return Some("the route is still being calculated".into());
        }
        self.waypoints
            .iter()
            .find(|w| !w.main_content().map(|n| n.ready).unwrap_or(false))
            .map(|w| format!("content for {} is not ready", w.name))
    }

    pub fn can_start_tour(&self) -> bool {
        self.start_blocker().is_none()
    }

    /// Starts the walk. When the cached route does not match the current
    /// waypoints a final computation is handed back instead, and navigation
    /// begins once it is passed to [`TourSession::finish_start`].
    pub fn begin_start(&mut self) -> TourResult<Option<RouteJob>> {
        if self.navigation.is_navigating() {
            return Err(TourError::NavigationActive);
        }
        if let Some(reason) = self.start_blocker() {
            return Err(TourError::NotReady(reason));
        }
        if let Some(job) = self.begin_route() {
            debug!("computing route before starting");
            return Ok(Some(job));
        }
        self.navigation.start(&mut self.waypoints)?;
        self.progress.reset();
        self.pending_question.clear();
        self.refresh_progress();
        self.notifier.info(format!(
            "Tour started: {} stops",
            self.waypoints.len()
        ));
        Ok(None)
    }

    /// Applies the route computed for a start and retries it. A failed route
    /// is notified but does not keep the walk from starting.
    pub fn finish_start(
        &mut self,
        job: RouteJob,
        outcome: TourResult<DirectionsResponse>,
    ) -> TourResult<Option<RouteJob>> {
        if let Err(err) = self.finish_route(job, outcome) {
            warn!("starting without a route: {}", err);
        }
        self.begin_start()
    }

    pub fn stop_navigation(&mut self) {
        self.navigation.stop();
        self.pending_question.clear();
        self.position_watch = None;
        self.refresh_progress();
    }

    /// Selects the position source. The watch for the previous source is
    /// cancelled.
    pub fn set_position_source(&mut self, mode: PositionSource) {
        if self.navigation.mode() != mode {
            self.position_watch = None;
        }
        self.navigation.set_mode(mode);
    }

    /// Keeps the task producing fixes for the current source alive for as
    /// long as the session wants it.
    pub fn attach_position_watch(&mut self, task: ScopedTask) {
        self.position_watch = Some(task);
    }

    pub fn has_position_watch(&self) -> bool {
        self.position_watch
            .as_ref()
            .map(|task| !task.is_finished())
            .unwrap_or(false)
    }

    /// Feeds one fix into navigation and refreshes the progress split.
    /// Fixes from the source that is not selected are ignored.
    pub fn on_position_fix(&mut self, fix: PositionFix) -> Option<Arrival> {
        if fix.source != self.navigation.mode() {
            debug!(
                "ignoring {:?} fix while using {:?}",
                fix.source,
                self.navigation.mode()
            );
            return None;
        }

        let arrival = self
            .navigation
            .on_position_update(&mut self.waypoints, fix.position);
        if let Some(arrival) = &arrival {
            self.metrics.record_arrival();
            if let Some(path) = &arrival.audio_path {
                self.playback.trigger(path.clone());
            }
            let name = self
                .waypoints
                .get(arrival.waypoint_index)
                .map(|w| w.name.clone())
                .unwrap_or_default();
            self.notifier.info(format!("Arrived at {}", name));
            if arrival.completed {
                self.notifier.info("Tour complete");
                self.position_watch = None;
            }
        }
        self.refresh_progress();
        arrival
    }

    fn refresh_progress(&mut self) {
        self.split = match self.navigation.state() {
            NavState::Idle => split_progress(
                self.route.path(),
                0,
                None,
                self.config.arrival_threshold_m,
            ),
            NavState::Navigating | NavState::Completed => self.progress.update(
                self.route.path(),
                &self.waypoints,
                self.navigation.current_position(),
            ),
        };
    }

    // --- follow-up questions ---

    pub fn set_pending_question(&mut self, text: impl Into<String>) {
        self.pending_question = text.into();
    }

    /// Snapshot of the question to send for the waypoint last reached.
    pub fn begin_follow_up(&self) -> TourResult<FollowUpRequest> {
        let tour_id = self.tour_id.clone().ok_or(TourError::NoActiveTour)?;
        let waypoint_id = self
            .navigation
            .active_follow_up()
            .ok_or_else(|| TourError::NotReady("no waypoint reached yet".into()))?;
        let question = self.pending_question.trim();
        if question.is_empty() {
            return Err(TourError::InvalidInput("question is empty".into()));
        }
        let waypoint = self
            .waypoints
            .iter()
            .find(|w| w.id == waypoint_id)
            .ok_or_else(|| TourError::InvalidInput("waypoint is no longer in the tour".into()))?;
        Ok(FollowUpRequest {
            tour_id,
            waypoint_id,
            waypoint_name: waypoint.name.clone(),
            question: question.to_owned(),
        })
    }

    /// Applies the backend's answer to a follow-up. A rejected request leaves
    /// the content untouched.
    pub fn finish_follow_up(
        &mut self,
        request: FollowUpRequest,
        outcome: TourResult<FollowUpReceipt>,
    ) -> TourResult<()> {
        let receipt = match outcome {
            Ok(receipt) => receipt,
            Err(err) => {
                self.notifier
                    .error(format!("Could not send question: {}", err));
                return Err(err);
            }
        };
        if self.tour_id.as_deref() != Some(request.tour_id.as_str()) {
            debug!("dropping follow-up receipt for tour {}", request.tour_id);
            return Ok(());
        }
        let waypoint = self
            .waypoints
            .iter_mut()
            .find(|w| w.id == request.waypoint_id)
            .ok_or_else(|| TourError::InvalidInput("waypoint is no longer in the tour".into()))?;
        append_follow_up(waypoint, &request.question, &receipt);
        if self.pending_question.trim() == request.question {
            self.pending_question.clear();
        }
        self.metrics.record_follow_up();
        self.notifier
            .info(format!("Question sent for {}", request.waypoint_name));
        Ok(())
    }

    // --- tour submission ---

    /// Marks a tour write as in flight and stops polling until it is done.
    pub fn begin_submission(&mut self) -> TourResult<Submission> {
        if self.submitting {
            return Err(TourError::NotReady(
                "a tour submission is already in progress".into(),
            ));
        }
        if self.waypoints.is_empty() {
            return Err(TourError::InvalidInput("the tour has no waypoints".into()));
        }
        self.submitting = true;
        if self.poller.take().is_some() {
            debug!("content polling paused for submission");
        }
        Ok(Submission {
            epoch: self.epoch,
            draft: self.draft(),
        })
    }

    pub fn finish_submission(
        &mut self,
        submission: Submission,
        outcome: TourResult<Tour>,
    ) -> TourResult<()> {
        if submission.epoch != self.epoch {
            debug!("dropping submission result from a previous workspace");
            return Ok(());
        }
        self.submitting = false;
        match outcome {
            Ok(tour) => {
                info!("tour saved as {}", tour.id);
                self.tour_id = Some(tour.id);
                if !tour.name.is_empty() {
                    self.name = tour.name;
                }
                let report = merge_remote(
                    &mut self.waypoints,
                    tour.waypoints,
                    self.config.match_epsilon_deg,
                );
                debug!("submission merge: {:?}", report);
                self.notifier.info("Tour saved");
                Ok(())
            }
            Err(err) => {
                self.notifier.error(format!("Could not save tour: {}", err));
                Err(err)
            }
        }
    }

    // --- content polling ---

    /// True when a loaded tour still has content being generated and no
    /// write is in flight.
    pub fn wants_polling(&self) -> bool {
        self.tour_id.is_some() && !self.submitting && needs_polling(&self.waypoints)
    }

    pub fn is_polling(&self) -> bool {
        self.poller
            .as_ref()
            .map(|task| !task.is_finished())
            .unwrap_or(false)
    }

    /// Spawns the content poller if polling is wanted and none is running.
    pub fn start_polling(
        &mut self,
        backend: Arc<dyn TourBackend>,
        outcomes: UnboundedSender<PollOutcome>,
    ) -> bool {
        if !self.wants_polling() || self.is_polling() {
            return false;
        }
        let Some(tour_id) = self.tour_id.clone() else {
            return false;
        };
        self.poll_generation += 1;
        self.poller = Some(spawn_content_poller(
            backend,
            tour_id,
            self.poll_generation,
            self.config.poll_interval(),
            outcomes,
        ));
        true
    }

    /// Folds one poll result into the tour. Returns false when the result
    /// was stale and dropped.
    pub fn apply_poll(&mut self, outcome: PollOutcome) -> bool {
        let current = self.poller.is_some()
            && !self.submitting
            && outcome.generation == self.poll_generation
            && self.tour_id.as_deref() == Some(outcome.tour_id.as_str());
        if !current {
            debug!(
                "dropping poll result {} for {}",
                outcome.generation, outcome.tour_id
            );
            return false;
        }

        match outcome.result {
            Ok(tour) => {
                self.metrics.record_poll(true);
                let report = merge_remote(
                    &mut self.waypoints,
                    tour.waypoints,
                    self.config.match_epsilon_deg,
                );
                debug!("poll merge: {:?}", report);
                if !needs_polling(&self.waypoints) {
                    info!("all tour content is ready");
                    self.poller = None;
                }
            }
            Err(err) => {
                self.metrics.record_poll(false);
                warn!("content polling stopped: {}", err);
                self.poller = None;
            }
        }
        true
    }
}

fn validate_coordinates(lat: f64, lng: f64) -> TourResult<()> {
    if lat.is_finite() && lng.is_finite() && lat.abs() <= 90.0 && lng.abs() <= 180.0 {
        Ok(())
    } else {
        Err(TourError::InvalidInput(format!(
            "invalid coordinates ({}, {})",
            lat, lng
        )))
    }
}
