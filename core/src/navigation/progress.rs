use crate::geo::{distance_meters, project_onto_segment, LatLng};
use crate::tour::Waypoint;
use serde::Serialize;

/// Route polyline split at the user's snapped position.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProgressSplit {
    pub completed: Vec<LatLng>,
    pub remaining: Vec<LatLng>,
    /// Start index of the segment the position snapped onto.
    pub snap_index: Option<usize>,
    /// Nearest sample, only when it is within the arrival threshold.
    pub closest_index: Option<usize>,
}

impl ProgressSplit {
    fn untouched(path: &[LatLng]) -> Self {
        Self {
            completed: Vec::new(),
            remaining: path.to_vec(),
            snap_index: None,
            closest_index: None,
        }
    }
}

/// Index of the path sample nearest to each waypoint, searched forward so the
/// indices never decrease along the tour.
pub fn waypoint_sample_indices(path: &[LatLng], waypoints: &[Waypoint]) -> Vec<usize> {
    if path.is_empty() {
        return Vec::new();
    }
    let mut floor = 0;
    waypoints
        .iter()
        .map(|waypoint| {
            floor = nearest_from(path, floor, waypoint.position())
                .map(|(idx, _)| idx)
                .unwrap_or(floor);
            floor
        })
        .collect()
}

fn nearest_from(path: &[LatLng], floor: usize, position: LatLng) -> Option<(usize, f64)> {
    path.iter()
        .enumerate()
        .skip(floor)
        .map(|(idx, sample)| (idx, distance_meters(position, *sample)))
        .fold(None, |best, candidate| match best {
            Some((_, best_d)) if best_d <= candidate.1 => best,
            _ => Some(candidate),
        })
}

/// Splits `path` at the projection of `position` onto the nearest segment at
/// or after `floor`. Earlier segments are never considered.
pub fn split_progress(
    path: &[LatLng],
    floor: usize,
    position: Option<LatLng>,
    threshold_m: f64,
) -> ProgressSplit {
    let position = match position {
        Some(position) if position.is_finite() && !path.is_empty() => position,
        _ => return ProgressSplit::untouched(path),
    };
    let floor = floor.min(path.len() - 1);

    let (segment, snapped) = if floor + 1 >= path.len() {
        (floor, path[floor])
    } else {
        let mut best = (floor, path[floor], f64::INFINITY);
        for idx in floor..path.len() - 1 {
            let projection = project_onto_segment(position, path[idx], path[idx + 1]);
            let distance = distance_meters(position, projection.point);
            if distance < best.2 {
                best = (idx, projection.point, distance);
            }
        }
        (best.0, best.1)
    };

    let mut completed = path[..=segment].to_vec();
    if completed.last() != Some(&snapped) {
        completed.push(snapped);
    }
    let mut remaining = vec![snapped];
    let tail = &path[segment + 1..];
    let tail = match tail.first() {
        Some(first) if *first == snapped => &tail[1..],
        _ => tail,
    };
    remaining.extend_from_slice(tail);

    let closest_index = nearest_from(path, floor, position)
        .filter(|(_, distance)| *distance < threshold_m)
        .map(|(idx, _)| idx);

    ProgressSplit {
        completed,
        remaining,
        snap_index: Some(segment),
        closest_index,
    }
}

/// Keeps the monotonic floor for progress splits: the sample index of the
/// furthest visited waypoint seen so far.
#[derive(Debug, Clone)]
pub struct ProgressTracker {
    floor: usize,
    threshold_m: f64,
}

impl ProgressTracker {
    pub fn new(threshold_m: f64) -> Self {
        Self {
            floor: 0,
            threshold_m,
        }
    }

    pub fn floor(&self) -> usize {
        self.floor
    }

    pub fn reset(&mut self) {
        self.floor = 0;
    }

    pub fn update(
        &mut self,
        path: &[LatLng],
        waypoints: &[Waypoint],
        position: Option<LatLng>,
    ) -> ProgressSplit {
        if waypoints.len() < 2 || path.is_empty() {
            return ProgressSplit::untouched(path);
        }
        if let Some(last_visited) = waypoints.iter().rposition(|w| w.visited) {
            let indices = waypoint_sample_indices(path, &waypoints[..=last_visited]);
            if let Some(&idx) = indices.last() {
                self.floor = self.floor.max(idx);
            }
        }
        split_progress(path, self.floor, position, self.threshold_m)
    }
}
