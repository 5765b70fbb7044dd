use crate::interface::TourBackend;
use crate::prelude::TourResult;
use crate::task::ScopedTask;
use crate::tour::Tour;
use log::{debug, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

/// Result of one poll cycle, tagged so stale results can be discarded.
#[derive(Debug)]
pub struct PollOutcome {
    pub tour_id: String,
    pub generation: u64,
    pub result: TourResult<Tour>,
}

/// Spawns the periodic content refresh for `tour_id`.
///
/// The first request goes out one `period` after spawning. A failed request
/// is reported once and ends the task; cycles never overlap because the next
/// tick waits for the previous request.
pub fn spawn_content_poller(
    backend: Arc<dyn TourBackend>,
    tour_id: String,
    generation: u64,
    period: Duration,
    outcomes: UnboundedSender<PollOutcome>,
) -> ScopedTask {
    ScopedTask::spawn("content poller", async move {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let result = backend.get_tour(&tour_id).await;
            let failed = result.is_err();
            if let Err(err) = &result {
                warn!("content poll for {} failed: {}", tour_id, err);
            }
            let outcome = PollOutcome {
                tour_id: tour_id.clone(),
                generation,
                result,
            };
            if outcomes.send(outcome).is_err() {
                debug!("poll receiver closed for {}", tour_id);
                break;
            }
            if failed {
                break;
            }
        }
    })
}
