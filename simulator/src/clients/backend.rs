use async_trait::async_trait;
use log::{debug, info};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use tourcore::interface::{parse_tour, parse_tour_list, FollowUpReceipt, TourBackend};
use tourcore::tour::{ContentNugget, Tour, TourDraft, Waypoint};
use tourcore::{TourError, TourResult};

fn backend_error(err: reqwest::Error) -> TourError {
    TourError::Backend(err.to_string())
}

/// Tour service reached over HTTP.
pub struct HttpTourBackend {
    client: reqwest::Client,
    base_url: String,
}

impl HttpTourBackend {
    pub fn new(base_url: &str) -> Self {
        let mut base_url = base_url.trim().to_string();
        if !base_url.ends_with('/') {
            base_url.push('/');
        }
        Self {
            client: reqwest::Client::new(),
            base_url,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn read_json(response: reqwest::Response) -> TourResult<Value> {
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(TourError::Backend(format!("{}: {}", status, text)));
        }
        response.json().await.map_err(backend_error)
    }

    async fn get(&self, path: &str) -> TourResult<Value> {
        let response = self
            .client
            .get(self.url(path))
            .send()
            .await
            .map_err(backend_error)?;
        Self::read_json(response).await
    }

    async fn post(&self, path: &str, body: &Value) -> TourResult<Value> {
        let response = self
            .client
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .map_err(backend_error)?;
        Self::read_json(response).await
    }
}

#[async_trait]
impl TourBackend for HttpTourBackend {
    async fn list_tours(&self) -> TourResult<Vec<Tour>> {
        parse_tour_list(self.get("tour/").await?)
    }

    async fn get_tour(&self, tour_id: &str) -> TourResult<Tour> {
        parse_tour(self.get(&format!("tour/{}", tour_id)).await?)
    }

    async fn create_tour(&self, draft: TourDraft) -> TourResult<Tour> {
        let body = serde_json::to_value(&draft)
            .map_err(|err| TourError::InvalidInput(err.to_string()))?;
        parse_tour(self.post("tour", &body).await?)
    }

    async fn post_follow_up(
        &self,
        tour_id: &str,
        waypoint_name: &str,
        question: &str,
    ) -> TourResult<FollowUpReceipt> {
        let body = json!({ "point_name": waypoint_name, "question": question });
        let value = self
            .post(&format!("tour/{}/question", tour_id), &body)
            .await?;
        // an empty body still means the question was accepted
        Ok(serde_json::from_value(value).unwrap_or_default())
    }
}

struct StoredTour {
    tour: Tour,
    fetches: u32,
    pending: Vec<(String, ContentNugget)>,
}

#[derive(Default)]
struct OfflineState {
    tours: HashMap<String, StoredTour>,
    next_id: u64,
}

/// In-process tour service. Content for a tour becomes ready after a fixed
/// number of fetches, and follow-up answers show up on the next fetch.
pub struct OfflineBackend {
    state: Mutex<OfflineState>,
    ready_after: u32,
    accept_follow_ups: bool,
}

impl OfflineBackend {
    pub fn new(ready_after: u32) -> Self {
        Self {
            state: Mutex::new(OfflineState::default()),
            ready_after,
            accept_follow_ups: true,
        }
    }

    /// Variant whose follow-up endpoint always fails.
    #[cfg(test)]
    pub fn rejecting_follow_ups(ready_after: u32) -> Self {
        Self {
            accept_follow_ups: false,
            ..Self::new(ready_after)
        }
    }

    fn lock(&self) -> TourResult<MutexGuard<'_, OfflineState>> {
        self.state
            .lock()
            .map_err(|_| TourError::Backend("offline store poisoned".into()))
    }
}

fn generate_content(tour_id: &str, index: usize, waypoint: &mut Waypoint) {
    if waypoint.content.is_empty() {
        waypoint.content.push(ContentNugget {
            id: format!("{}-{}", tour_id, index),
            question: None,
            answer: Some(format!("A short story about {}.", waypoint.name)),
            audio_path: Some(format!("audio/{}/{}.mp3", tour_id, index)),
            ready: true,
        });
    }
}

#[async_trait]
impl TourBackend for OfflineBackend {
    async fn list_tours(&self) -> TourResult<Vec<Tour>> {
        let state = self.lock()?;
        Ok(state.tours.values().map(|stored| stored.tour.clone()).collect())
    }

    async fn get_tour(&self, tour_id: &str) -> TourResult<Tour> {
        let mut state = self.lock()?;
        let stored = state
            .tours
            .get_mut(tour_id)
            .ok_or_else(|| TourError::Backend(format!("tour {} not found", tour_id)))?;
        stored.fetches += 1;
        if stored.fetches >= self.ready_after {
            for (index, waypoint) in stored.tour.waypoints.iter_mut().enumerate() {
                generate_content(tour_id, index, waypoint);
            }
        }
        for (name, mut nugget) in stored.pending.drain(..) {
            if let Some(waypoint) = stored.tour.waypoints.iter_mut().find(|w| w.name == name) {
                nugget.answer = Some("Nobody remembers, which is part of the charm.".into());
                nugget.ready = true;
                waypoint.content.push(nugget);
            }
        }
        Ok(stored.tour.clone())
    }

    async fn create_tour(&self, draft: TourDraft) -> TourResult<Tour> {
        let mut state = self.lock()?;
        state.next_id += 1;
        let tour = Tour {
            id: format!("offline-{}", state.next_id),
            name: draft.tour_name,
            guide_personality: draft.tour_guide_personality,
            user_preferences: draft.user_preferences,
            waypoints: draft
                .points
                .into_iter()
                .map(|point| Waypoint::new(point.location, point.latitude, point.longitude))
                .collect(),
            audio_output_dir: None,
        };
        info!("offline backend stored tour {}", tour.id);
        state.tours.insert(
            tour.id.clone(),
            StoredTour {
                tour: tour.clone(),
                fetches: 0,
                pending: Vec::new(),
            },
        );
        Ok(tour)
    }

    async fn post_follow_up(
        &self,
        tour_id: &str,
        waypoint_name: &str,
        question: &str,
    ) -> TourResult<FollowUpReceipt> {
        if !self.accept_follow_ups {
            return Err(TourError::Backend("question service unavailable".into()));
        }
        let mut state = self.lock()?;
        state.next_id += 1;
        let nugget_id = format!("q-{}", state.next_id);
        let stored = state
            .tours
            .get_mut(tour_id)
            .ok_or_else(|| TourError::Backend(format!("tour {} not found", tour_id)))?;
        stored.pending.push((
            waypoint_name.to_string(),
            ContentNugget::pending_follow_up(nugget_id.clone(), question),
        ));
        debug!("offline backend queued {} for {}", nugget_id, waypoint_name);
        Ok(FollowUpReceipt {
            nugget: None,
            nugget_id: Some(nugget_id),
        })
    }
}
