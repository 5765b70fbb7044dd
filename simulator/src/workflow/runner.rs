use crate::generator::walk::{build_walk, WalkConfig};
use crate::gui_bridge::bridge::{BridgeCommand, GuiBridge};
use crate::gui_bridge::model::SessionSnapshot;
use crate::player::{MediaPlayer, PlayerState};
use crate::workflow::config::WorkflowConfig;
use anyhow::{bail, Context};
use log::{info, warn};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::time::{sleep, sleep_until, Instant};
use tourcore::content::PollOutcome;
use tourcore::interface::{AudioSink, DirectionsProvider, TourBackend};
use tourcore::navigation::{Arrival, NavState, PositionFix, PositionSource};
use tourcore::task::ScopedTask;
use tourcore::tour::Tour;
use tourcore::{LatLng, NavigationConfig, TourResult, TourSession};

/// Outcome of a replayed walk.
#[derive(Debug, Clone, PartialEq)]
pub struct WalkSummary {
    pub fixes: usize,
    pub arrivals: usize,
    pub completed: bool,
    pub completed_path: usize,
    pub remaining_path: usize,
    pub route_length_m: f64,
    pub follow_ups: usize,
    pub audio_starts: usize,
}

impl fmt::Display for WalkSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "fixes={} arrivals={} completed={} completed_path={} remaining_path={} route_m={:.0} follow_ups={} audio_starts={}",
            self.fixes,
            self.arrivals,
            self.completed,
            self.completed_path,
            self.remaining_path,
            self.route_length_m,
            self.follow_ups,
            self.audio_starts
        )
    }
}

/// Drives a [`TourSession`] against a backend and a directions provider.
pub struct Runner {
    session: TourSession,
    backend: Arc<dyn TourBackend>,
    directions: Arc<dyn DirectionsProvider>,
    player: MediaPlayer,
    bridge: Option<Arc<GuiBridge>>,
    poll_tx: UnboundedSender<PollOutcome>,
    poll_rx: UnboundedReceiver<PollOutcome>,
}

impl Runner {
    pub fn new(
        config: &NavigationConfig,
        backend: Arc<dyn TourBackend>,
        directions: Arc<dyn DirectionsProvider>,
    ) -> Self {
        let (poll_tx, poll_rx) = mpsc::unbounded_channel();
        Self {
            session: TourSession::new(config.clone()),
            backend,
            directions,
            player: MediaPlayer::new(),
            bridge: None,
            poll_tx,
            poll_rx,
        }
    }

    pub fn with_bridge(mut self, bridge: Arc<GuiBridge>) -> Self {
        self.bridge = Some(bridge);
        self
    }

    pub fn session(&self) -> &TourSession {
        &self.session
    }

    fn publish(&self) {
        if let Some(bridge) = &self.bridge {
            let mut snapshot = SessionSnapshot::capture(&self.session);
            snapshot.now_playing = self.player.display_name();
            snapshot.audio_paused = self.player.state() == PlayerState::Paused;
            bridge.publish(snapshot);
        }
    }

    /// Builds the tour from the workflow, routes it and saves it.
    pub async fn plan(&mut self, config: &WorkflowConfig) -> anyhow::Result<()> {
        self.session.set_details(
            config.tour_name.clone(),
            config.guide_personality.clone(),
            config.user_preferences.clone(),
        );
        for point in &config.points {
            self.session
                .add_point(point.lat, point.lng, point.name.as_deref())
                .with_context(|| format!("adding point ({}, {})", point.lat, point.lng))?;
        }
        self.refresh_route().await;
        self.submit().await.context("saving tour")?;
        self.publish();
        Ok(())
    }

    pub async fn list_tours(&self) -> TourResult<Vec<Tour>> {
        self.backend.list_tours().await
    }

    /// Reopens a saved tour: routes it and restarts content polling.
    pub async fn open_tour(&mut self, tour_id: &str) -> anyhow::Result<()> {
        let tour = self
            .backend
            .get_tour(tour_id)
            .await
            .with_context(|| format!("fetching tour {}", tour_id))?;
        self.session.load_tour(tour);
        self.refresh_route().await;
        self.ensure_polling();
        self.publish();
        Ok(())
    }

    /// Recomputes the route until the cached one matches the waypoints.
    pub async fn refresh_route(&mut self) {
        while let Some(job) = self.session.begin_route() {
            let outcome = self.directions.route(job.request.clone()).await;
            if let Err(err) = self.session.finish_route(job, outcome) {
                warn!("route unavailable: {}", err);
            }
        }
    }

    /// Enters navigation once the route matches the current waypoints.
    pub async fn start_tour(&mut self) -> TourResult<()> {
        let mut pending = self.session.begin_start()?;
        while let Some(job) = pending {
            let outcome = self.directions.route(job.request.clone()).await;
            pending = self.session.finish_start(job, outcome)?;
        }
        self.publish();
        Ok(())
    }

    pub async fn submit(&mut self) -> TourResult<()> {
        let submission = self.session.begin_submission()?;
        let outcome = self.backend.create_tour(submission.draft.clone()).await;
        self.session.finish_submission(submission, outcome)
    }

    fn ensure_polling(&mut self) {
        if self
            .session
            .start_polling(self.backend.clone(), self.poll_tx.clone())
        {
            info!("polling tour content");
        }
    }

    fn apply_poll(&mut self, outcome: PollOutcome) {
        self.session.apply_poll(outcome);
        self.publish();
    }

    fn drain_polls(&mut self) {
        while let Ok(outcome) = self.poll_rx.try_recv() {
            self.apply_poll(outcome);
        }
        self.ensure_polling();
    }

    /// Polls until every waypoint has its main content, or fails after
    /// `timeout`.
    pub async fn wait_until_ready(&mut self, timeout: Duration) -> anyhow::Result<()> {
        let deadline = Instant::now() + timeout;
        self.ensure_polling();
        while !self.session.can_start_tour() {
            if !self.session.is_polling() {
                bail!(
                    "content polling stopped before the tour was ready: {}",
                    self.session.start_blocker().unwrap_or_default()
                );
            }
            tokio::select! {
                Some(outcome) = self.poll_rx.recv() => self.apply_poll(outcome),
                _ = sleep_until(deadline) => bail!("timed out waiting for tour content"),
            }
        }
        Ok(())
    }

    pub async fn ask_follow_up(&mut self, question: &str) -> TourResult<()> {
        self.session.set_pending_question(question);
        let request = self.session.begin_follow_up()?;
        let outcome = self
            .backend
            .post_follow_up(&request.tour_id, &request.waypoint_name, &request.question)
            .await;
        let result = self.session.finish_follow_up(request, outcome);
        self.ensure_polling();
        self.publish();
        result
    }

    pub fn handle_fix(&mut self, fix: PositionFix) -> Option<Arrival> {
        let arrival = self.session.on_position_fix(fix);
        self.player.sync(self.session.playback());
        self.publish();
        arrival
    }

    /// Starts navigation and replays a generated walk along the route as the
    /// real geolocation stream. The replay runs as the session's position
    /// watch, so stopping or completing the tour ends it.
    pub async fn replay_walk(
        &mut self,
        walk: &WalkConfig,
        question: Option<&str>,
    ) -> anyhow::Result<WalkSummary> {
        self.session.set_position_source(PositionSource::RealGeolocation);
        self.start_tour().await.context("starting navigation")?;

        let stops: Vec<_> = self
            .session
            .waypoints()
            .iter()
            .map(|waypoint| waypoint.position())
            .collect();
        let fixes = build_walk(self.session.route().path(), &stops, walk);
        let mut fix_rx = spawn_replay(&mut self.session, fixes, walk.fix_interval());
        let mut pending_question = question.map(str::to_owned);
        let mut replayed = 0;

        while let Some(fix) = fix_rx.recv().await {
            replayed += 1;
            if let Some(arrival) = self.handle_fix(fix) {
                if !arrival.completed {
                    if let Some(question) = pending_question.take() {
                        if let Err(err) = self.ask_follow_up(&question).await {
                            warn!("follow-up not sent: {}", err);
                        }
                    }
                }
            }
            self.drain_polls();
            if self.session.navigation().state() != NavState::Navigating {
                break;
            }
        }

        let metrics = self.session.metrics().snapshot();
        let progress = self.session.progress();
        Ok(WalkSummary {
            fixes: replayed,
            arrivals: metrics.arrivals,
            completed: self.session.navigation().state() == NavState::Completed,
            completed_path: progress.completed.len(),
            remaining_path: progress.remaining.len(),
            route_length_m: self.session.route().total_length_m(),
            follow_ups: metrics.follow_ups,
            audio_starts: self.player.starts(),
        })
    }

    /// Serves bridge commands as simulated clicks until the channel closes or
    /// `shutdown` resolves.
    pub async fn run_interactive<F>(
        &mut self,
        mut commands: UnboundedReceiver<BridgeCommand>,
        shutdown: F,
    ) -> anyhow::Result<()>
    where
        F: Future<Output = ()>,
    {
        self.session
            .set_position_source(PositionSource::SimulatedClick);
        if self.session.can_start_tour() {
            self.start_tour().await.context("starting navigation")?;
        }
        self.ensure_polling();
        self.publish();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(BridgeCommand::Click(fix)) => {
                        self.handle_fix(fix);
                    }
                    Some(BridgeCommand::Question(text)) => {
                        if let Err(err) = self.ask_follow_up(&text).await {
                            warn!("follow-up not sent: {}", err);
                        }
                    }
                    Some(BridgeCommand::TogglePause) => {
                        self.player.toggle_pause();
                        self.publish();
                    }
                    Some(BridgeCommand::Stop) => {
                        self.session.stop_navigation();
                        self.publish();
                    }
                    None => break,
                },
                Some(outcome) = self.poll_rx.recv() => {
                    self.apply_poll(outcome);
                    self.ensure_polling();
                }
                _ = &mut shutdown => break,
            }
        }
        info!("session loop finished");
        Ok(())
    }
}

/// Feeds `fixes` into a channel from a task owned by the session's position
/// watch.
fn spawn_replay(
    session: &mut TourSession,
    fixes: Vec<LatLng>,
    interval: Duration,
) -> UnboundedReceiver<PositionFix> {
    let (tx, rx) = mpsc::unbounded_channel();
    session.attach_position_watch(ScopedTask::spawn("walk replay", async move {
        for position in fixes {
            let fix = PositionFix {
                source: PositionSource::RealGeolocation,
                position,
            };
            if tx.send(fix).is_err() {
                break;
            }
            sleep(interval).await;
        }
    }));
    rx
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::backend::OfflineBackend;
    use crate::clients::directions::StraightLineDirections;

    fn offline_runner(backend: OfflineBackend) -> Runner {
        shared_runner(Arc::new(backend))
    }

    fn shared_runner(backend: Arc<OfflineBackend>) -> Runner {
        let config = WorkflowConfig::default();
        Runner::new(
            &config.navigation,
            backend,
            Arc::new(StraightLineDirections),
        )
    }

    /// Saves the default workflow's tour and returns its id.
    async fn saved_tour(backend: &Arc<OfflineBackend>) -> String {
        let mut planner = shared_runner(backend.clone());
        planner.plan(&WorkflowConfig::default()).await.unwrap();
        planner.session().tour_id().unwrap().to_string()
    }

    #[tokio::test(start_paused = true)]
    async fn offline_walk_completes_tour() {
        let config = WorkflowConfig::default();
        let mut runner = offline_runner(OfflineBackend::new(1));
        runner.plan(&config).await.unwrap();
        assert!(runner.session().tour_id().is_some());
        assert!(!runner.session().route().path().is_empty());
        assert!(!runner.session().can_start_tour());

        runner
            .wait_until_ready(Duration::from_secs(60))
            .await
            .unwrap();
        let summary = runner
            .replay_walk(&config.walk, config.follow_up_question.as_deref())
            .await
            .unwrap();

        assert!(summary.completed);
        assert_eq!(summary.arrivals, config.points.len());
        assert_eq!(summary.audio_starts, config.points.len());
        assert_eq!(summary.follow_ups, 1);
        assert!(summary.completed_path > summary.remaining_path);
        assert!(summary.to_string().contains("completed=true"));
        assert!(!runner.session().has_position_watch());
    }

    #[tokio::test(start_paused = true)]
    async fn reopened_tour_is_routed_and_polled() {
        let config = WorkflowConfig::default();
        let backend = Arc::new(OfflineBackend::new(2));
        let tour_id = saved_tour(&backend).await;

        let mut runner = shared_runner(backend.clone());
        let listed = runner.list_tours().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, tour_id);

        runner.open_tour(&tour_id).await.unwrap();
        assert_eq!(runner.session().tour_id(), Some(tour_id.as_str()));
        assert_eq!(runner.session().waypoints().len(), config.points.len());
        assert!(!runner.session().route().path().is_empty());
        assert!(runner.session().is_polling());

        runner
            .wait_until_ready(Duration::from_secs(60))
            .await
            .unwrap();
        let summary = runner.replay_walk(&config.walk, None).await.unwrap();
        assert!(summary.completed);
        assert_eq!(summary.arrivals, config.points.len());
    }

    #[tokio::test(start_paused = true)]
    async fn opening_unknown_tour_fails() {
        let mut runner = offline_runner(OfflineBackend::new(1));
        let err = runner.open_tour("offline-404").await.unwrap_err();
        assert!(err.to_string().contains("offline-404"));
        assert_eq!(runner.session().tour_id(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn loaded_tour_is_routed_when_the_walk_starts() {
        let config = WorkflowConfig::default();
        let backend = Arc::new(OfflineBackend::new(1));
        let tour_id = saved_tour(&backend).await;

        let mut runner = shared_runner(backend.clone());
        let tour = backend.get_tour(&tour_id).await.unwrap();
        runner.session.load_tour(tour);
        assert!(runner.session().route().path().is_empty());
        assert!(runner.session().can_start_tour());

        let summary = runner.replay_walk(&config.walk, None).await.unwrap();
        assert!(summary.completed);
        assert!(summary.route_length_m > 0.0);
        assert!(summary.completed_path > 0);
        assert_eq!(runner.session().metrics().snapshot().route_computations, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn stopping_ends_the_replayed_walk() {
        let config = WorkflowConfig::default();
        let mut runner = offline_runner(OfflineBackend::new(1));
        runner.plan(&config).await.unwrap();
        runner
            .wait_until_ready(Duration::from_secs(60))
            .await
            .unwrap();
        runner
            .session
            .set_position_source(PositionSource::RealGeolocation);
        runner.start_tour().await.unwrap();

        let fixes = vec![LatLng::new(50.0, 50.0); 3];
        let mut fix_rx = spawn_replay(&mut runner.session, fixes, Duration::from_secs(1));
        assert!(fix_rx.recv().await.is_some());
        assert!(runner.session().has_position_watch());

        runner.session.stop_navigation();
        assert!(!runner.session().has_position_watch());
        assert!(fix_rx.recv().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn rejected_question_does_not_stop_the_walk() {
        let config = WorkflowConfig::default();
        let mut runner = offline_runner(OfflineBackend::rejecting_follow_ups(1));
        runner.plan(&config).await.unwrap();
        runner
            .wait_until_ready(Duration::from_secs(60))
            .await
            .unwrap();
        let summary = runner
            .replay_walk(&config.walk, Some("Who built this?"))
            .await
            .unwrap();
        assert!(summary.completed);
        assert_eq!(summary.follow_ups, 0);
        assert!(runner
            .session()
            .waypoints()
            .iter()
            .all(|waypoint| waypoint.content.len() == 1));
    }

    #[tokio::test(start_paused = true)]
    async fn waiting_times_out_when_content_never_arrives() {
        let config = WorkflowConfig::default();
        let mut runner = offline_runner(OfflineBackend::new(u32::MAX));
        runner.plan(&config).await.unwrap();
        let err = runner
            .wait_until_ready(Duration::from_secs(20))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("timed out"));
    }

    #[tokio::test(start_paused = true)]
    async fn bridge_clicks_walk_the_tour() {
        let config = WorkflowConfig::default();
        let (bridge_tx, bridge_rx) = mpsc::unbounded_channel();
        // the bridge gets its own channel so dropping `bridge_tx` ends the loop
        let (http_tx, _http_rx) = mpsc::unbounded_channel();
        let bridge = Arc::new(GuiBridge::new(http_tx));
        let mut runner = offline_runner(OfflineBackend::new(1)).with_bridge(bridge.clone());
        runner.plan(&config).await.unwrap();
        runner
            .wait_until_ready(Duration::from_secs(60))
            .await
            .unwrap();

        let stops: Vec<LatLng> = runner
            .session()
            .waypoints()
            .iter()
            .map(|waypoint| waypoint.position())
            .collect();
        for stop in stops {
            bridge_tx
                .send(BridgeCommand::Click(PositionFix {
                    source: PositionSource::SimulatedClick,
                    position: stop,
                }))
                .unwrap();
        }
        drop(bridge_tx);

        runner
            .run_interactive(bridge_rx, std::future::pending())
            .await
            .unwrap();
        assert_eq!(runner.session().navigation().state(), NavState::Completed);
        assert_eq!(bridge.snapshot().state, NavState::Completed);
        assert!(bridge.snapshot().waypoints.iter().all(|w| w.visited));
    }
}
