use crate::geo::{path_length_meters, resample, LatLng, PolylineCodec};
use crate::interface::{DirectionsRequest, DirectionsResponse, RouteLeg};
use crate::prelude::{TourError, TourResult};
use crate::tour::model::{route_keys, Waypoint, WaypointId, WaypointKey};
use log::{debug, info, warn};

/// Exact change detector over `(lat, lng, name)`; no geographic tolerance.
pub fn points_equal(a: &[WaypointKey], b: &[WaypointKey]) -> bool {
    a.len() == b.len()
        && a.iter()
            .zip(b)
            .all(|(x, y)| x.lat == y.lat && x.lng == y.lng && x.name == y.name)
}

/// Gate in front of the directions provider.
pub fn should_recompute(
    current: &[WaypointKey],
    last_calculated: &[WaypointKey],
    is_calculating: bool,
    is_navigating: bool,
) -> bool {
    current.len() >= 2
        && !is_calculating
        && !is_navigating
        && !points_equal(current, last_calculated)
}

/// An in-flight route computation.
#[derive(Debug, Clone)]
pub struct RouteJob {
    pub request: DirectionsRequest,
    epoch: u64,
    ids: Vec<WaypointId>,
    keys: Vec<WaypointKey>,
}

/// Cached route geometry plus the waypoint ordering it was computed for.
#[derive(Debug, Default)]
pub struct Route {
    path: Vec<LatLng>,
    legs: Vec<RouteLeg>,
    last_calculated: Vec<WaypointKey>,
    calculating: bool,
    // bumped by clear() so jobs started before it are discarded
    epoch: u64,
}

impl Route {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn path(&self) -> &[LatLng] {
        &self.path
    }

    pub fn legs(&self) -> &[RouteLeg] {
        &self.legs
    }

    pub fn last_calculated(&self) -> &[WaypointKey] {
        &self.last_calculated
    }

    pub fn is_calculating(&self) -> bool {
        self.calculating
    }

    pub fn total_length_m(&self) -> f64 {
        path_length_meters(&self.path)
    }

    pub fn needs_recompute(&self, waypoints: &[Waypoint], navigating: bool) -> bool {
        should_recompute(
            &route_keys(waypoints),
            &self.last_calculated,
            self.calculating,
            navigating,
        )
    }

    /// Drops the cached geometry when the tour no longer forms a route.
    pub fn sync_with(&mut self, waypoints: &[Waypoint]) {
        if waypoints.len() < 2 {
            self.path.clear();
            self.legs.clear();
            self.last_calculated.clear();
        }
    }

    pub fn clear(&mut self) {
        self.path.clear();
        self.legs.clear();
        self.last_calculated.clear();
        self.calculating = false;
        self.epoch += 1;
    }

    /// Starts a computation if the gate allows it, marking the route busy
    /// until [`Route::complete`] is called with the job.
    pub fn begin(&mut self, waypoints: &[Waypoint], navigating: bool) -> Option<RouteJob> {
        if !self.needs_recompute(waypoints, navigating) {
            return None;
        }
        let positions: Vec<LatLng> = waypoints.iter().map(Waypoint::position).collect();
        let request = DirectionsRequest::walking(&positions)?;
        self.calculating = true;
        debug!(
            "route computation started for {} waypoints",
            waypoints.len()
        );
        Some(RouteJob {
            request,
            epoch: self.epoch,
            ids: waypoints.iter().map(|w| w.id).collect(),
            keys: route_keys(waypoints),
        })
    }

    /// Applies the provider's answer for `job`.
    ///
    /// On success the waypoints are put in the optimized order and the decoded
    /// path is cached. On failure the path is cleared; the snapshot is still
    /// recorded so the same ordering is not retried until it changes.
    pub fn complete(
        &mut self,
        job: RouteJob,
        outcome: TourResult<DirectionsResponse>,
        waypoints: &mut Vec<Waypoint>,
        resample_interval_m: f64,
    ) -> TourResult<()> {
        if job.epoch != self.epoch {
            debug!("discarding route result from a cleared workspace");
            return Ok(());
        }
        self.calculating = false;

        let response = match outcome {
            Ok(response) if response.is_ok() => response,
            Ok(response) => {
                warn!("directions provider returned {}", response.status);
                return self.fail(job, TourError::Directions(response.status));
            }
            Err(err) => {
                warn!("directions request failed: {}", err);
                return self.fail(job, err);
            }
        };

        let order = match full_order(&response.waypoint_order, job.ids.len()) {
            Some(order) => order,
            None => {
                return self.fail(
                    job,
                    TourError::Directions(format!(
                        "invalid waypoint order {:?}",
                        response.waypoint_order
                    )),
                )
            }
        };

        let ordered_ids: Vec<WaypointId> = order.iter().map(|&idx| job.ids[idx]).collect();
        apply_order(waypoints, &ordered_ids);

        self.path = resample(
            &PolylineCodec::decode(&response.overview_polyline),
            resample_interval_m,
        );
        self.legs = response.legs;
        self.last_calculated = order.iter().map(|&idx| job.keys[idx].clone()).collect();
        info!(
            "route ready: {} samples, {:.0} m",
            self.path.len(),
            self.total_length_m()
        );
        Ok(())
    }

    fn fail(&mut self, job: RouteJob, err: TourError) -> TourResult<()> {
        self.path.clear();
        self.legs.clear();
        self.last_calculated = job.keys;
        Err(err)
    }
}

/// Expands the optimized order of intermediates into an order over all
/// waypoints, keeping the first and last fixed. Rejects anything that is not
/// a permutation.
fn full_order(intermediate_order: &[usize], count: usize) -> Option<Vec<usize>> {
    if count < 2 {
        return None;
    }
    let intermediates = count - 2;
    if intermediate_order.is_empty() && intermediates > 0 {
        return Some((0..count).collect());
    }
    if intermediate_order.len() != intermediates {
        return None;
    }
    let mut seen = vec![false; intermediates];
    for &idx in intermediate_order {
        if idx >= intermediates || std::mem::replace(&mut seen[idx], true) {
            return None;
        }
    }

    let mut order = Vec::with_capacity(count);
    order.push(0);
    order.extend(intermediate_order.iter().map(|idx| idx + 1));
    order.push(count - 1);
    Some(order)
}

/// Reorders `waypoints` by id. Waypoints removed since the snapshot stay
/// removed; ones added since are kept at the end in their current order.
fn apply_order(waypoints: &mut Vec<Waypoint>, ordered_ids: &[WaypointId]) {
    let mut pending: Vec<Option<Waypoint>> = std::mem::take(waypoints)
        .into_iter()
        .map(Some)
        .collect();

    for id in ordered_ids {
        let slot = pending
            .iter_mut()
            .find(|slot| slot.as_ref().map(|w| w.id) == Some(*id));
        if let Some(waypoint) = slot.and_then(Option::take) {
            waypoints.push(waypoint);
        }
    }
    waypoints.extend(pending.into_iter().flatten());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interface::STATUS_OK;
    use crate::tour::ContentNugget;

    fn tour(points: &[(&str, f64, f64)]) -> Vec<Waypoint> {
        points
            .iter()
            .map(|(name, lat, lng)| Waypoint::new(*name, *lat, *lng))
            .collect()
    }

    fn ok_response(order: Vec<usize>, path: &[LatLng]) -> DirectionsResponse {
        DirectionsResponse {
            status: STATUS_OK.into(),
            waypoint_order: order,
            overview_polyline: PolylineCodec::encode(path),
            legs: Vec::new(),
        }
    }

    #[test]
    fn points_equal_is_exact() {
        let a = route_keys(&tour(&[("A", 1.0, 2.0), ("B", 3.0, 4.0)]));
        let mut b = a.clone();
        assert!(points_equal(&a, &b));
        b[1].lng += 1e-12;
        assert!(!points_equal(&a, &b));
        b = a.clone();
        b[0].name = "a".into();
        assert!(!points_equal(&a, &b));
        assert!(!points_equal(&a, &a[..1]));
    }

    #[test]
    fn short_tours_never_recompute() {
        assert!(!should_recompute(&[], &[], false, false));
        let one = route_keys(&tour(&[("A", 0.0, 0.0)]));
        assert!(!should_recompute(&one, &[], false, false));
    }

    #[test]
    fn recompute_gate_respects_flags() {
        let keys = route_keys(&tour(&[("A", 0.0, 0.0), ("B", 0.0, 0.001)]));
        assert!(should_recompute(&keys, &[], false, false));
        assert!(!should_recompute(&keys, &[], true, false));
        assert!(!should_recompute(&keys, &[], false, true));
        assert!(!should_recompute(&keys, &keys, false, false));
    }

    #[test]
    fn begin_marks_route_busy() {
        let waypoints = tour(&[("A", 0.0, 0.0), ("B", 0.0, 0.001)]);
        let mut route = Route::new();
        let job = route.begin(&waypoints, false).unwrap();
        assert!(route.is_calculating());
        assert!(route.begin(&waypoints, false).is_none());
        assert_eq!(job.request.intermediates.len(), 0);
    }

    #[test]
    fn success_reorders_and_keeps_content() {
        let mut waypoints = tour(&[
            ("Start", 0.0, 0.0),
            ("Far", 0.0, 0.003),
            ("Near", 0.0, 0.001),
            ("End", 0.0, 0.004),
        ]);
        waypoints[1].content.push(ContentNugget {
            id: "far-main".into(),
            ready: true,
            ..Default::default()
        });

        let mut route = Route::new();
        let job = route.begin(&waypoints, false).unwrap();
        let path = [LatLng::new(0.0, 0.0), LatLng::new(0.0, 0.004)];
        route
            .complete(job, Ok(ok_response(vec![1, 0], &path)), &mut waypoints, 10.0)
            .unwrap();

        let names: Vec<_> = waypoints.iter().map(|w| w.name.as_str()).collect();
        assert_eq!(names, vec!["Start", "Near", "Far", "End"]);
        assert_eq!(waypoints[2].content[0].id, "far-main");
        assert!(!route.is_calculating());
        assert_eq!(route.path().last(), Some(&path[1]));
        assert!(route.path().len() > 2);
        assert!(!route.needs_recompute(&waypoints, false));
    }

    #[test]
    fn waypoints_added_during_computation_are_kept() {
        let mut waypoints = tour(&[("A", 0.0, 0.0), ("B", 0.0, 0.001), ("C", 0.0, 0.002)]);
        let mut route = Route::new();
        let job = route.begin(&waypoints, false).unwrap();
        waypoints.push(Waypoint::new("Late", 0.0, 0.005));

        let path = [LatLng::new(0.0, 0.0), LatLng::new(0.0, 0.002)];
        route
            .complete(job, Ok(ok_response(vec![0], &path)), &mut waypoints, 10.0)
            .unwrap();
        assert_eq!(waypoints.last().map(|w| w.name.as_str()), Some("Late"));
        assert!(route.needs_recompute(&waypoints, false));
    }

    #[test]
    fn failure_clears_path_and_blocks_retry() {
        let mut waypoints = tour(&[("A", 0.0, 0.0), ("B", 0.0, 0.001)]);
        let mut route = Route::new();
        let job = route.begin(&waypoints, false).unwrap();
        let path = [LatLng::new(0.0, 0.0), LatLng::new(0.0, 0.001)];
        route
            .complete(job, Ok(ok_response(vec![], &path)), &mut waypoints, 10.0)
            .unwrap();
        assert!(!route.path().is_empty());

        waypoints[1].lng = 0.002;
        let job = route.begin(&waypoints, false).unwrap();
        let err = route
            .complete(
                job,
                Ok(DirectionsResponse::failed("ZERO_RESULTS")),
                &mut waypoints,
                10.0,
            )
            .unwrap_err();
        assert_eq!(err, TourError::Directions("ZERO_RESULTS".into()));
        assert!(route.path().is_empty());
        assert!(!route.is_calculating());
        assert!(!route.needs_recompute(&waypoints, false));
    }

    #[test]
    fn transport_errors_are_reported() {
        let mut waypoints = tour(&[("A", 0.0, 0.0), ("B", 0.0, 0.001)]);
        let mut route = Route::new();
        let job = route.begin(&waypoints, false).unwrap();
        let result = route.complete(
            job,
            Err(TourError::Directions("timeout".into())),
            &mut waypoints,
            10.0,
        );
        assert!(result.is_err());
        assert!(route.path().is_empty());
    }

    #[test]
    fn jobs_from_before_clear_are_discarded() {
        let mut waypoints = tour(&[("A", 0.0, 0.0), ("B", 0.0, 0.001)]);
        let mut route = Route::new();
        let job = route.begin(&waypoints, false).unwrap();
        route.clear();
        assert!(!route.is_calculating());

        let path = [LatLng::new(0.0, 0.0), LatLng::new(0.0, 0.001)];
        route
            .complete(job, Ok(ok_response(vec![], &path)), &mut waypoints, 10.0)
            .unwrap();
        assert!(route.path().is_empty());
        assert!(route.last_calculated().is_empty());
    }

    #[test]
    fn non_permutation_order_is_rejected() {
        assert_eq!(full_order(&[1, 0], 4), Some(vec![0, 2, 1, 3]));
        assert_eq!(full_order(&[], 2), Some(vec![0, 1]));
        assert_eq!(full_order(&[], 3), Some(vec![0, 1, 2]));
        assert_eq!(full_order(&[0, 0], 4), None);
        assert_eq!(full_order(&[2], 3), None);
        assert_eq!(full_order(&[0, 1, 2], 4), None);
    }

    #[test]
    fn short_tour_drops_cached_route() {
        let mut waypoints = tour(&[("A", 0.0, 0.0), ("B", 0.0, 0.001)]);
        let mut route = Route::new();
        let job = route.begin(&waypoints, false).unwrap();
        let path = [LatLng::new(0.0, 0.0), LatLng::new(0.0, 0.001)];
        route
            .complete(job, Ok(ok_response(vec![], &path)), &mut waypoints, 10.0)
            .unwrap();

        waypoints.pop();
        route.sync_with(&waypoints);
        assert!(route.path().is_empty());
        assert!(route.last_calculated().is_empty());
    }
}
