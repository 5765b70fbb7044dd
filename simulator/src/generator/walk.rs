use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tourcore::geo::{distance_meters, resample, EARTH_RADIUS_M};
use tourcore::LatLng;

/// Configuration for generating a synthetic walk along a route.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WalkConfig {
    /// Distance between consecutive fixes.
    pub step_m: f64,
    /// Maximum offset added to each fix, per axis.
    pub jitter_m: f64,
    /// Extra fixes reported at each stop.
    pub dwell_fixes: usize,
    pub seed: u64,
    /// Delay between replayed fixes.
    pub fix_interval_ms: u64,
}

impl Default for WalkConfig {
    fn default() -> Self {
        Self {
            step_m: 8.0,
            jitter_m: 4.0,
            dwell_fixes: 2,
            seed: 0,
            fix_interval_ms: 250,
        }
    }
}

impl WalkConfig {
    pub fn fix_interval(&self) -> Duration {
        Duration::from_millis(self.fix_interval_ms)
    }
}

fn offset_meters(point: LatLng, north_m: f64, east_m: f64) -> LatLng {
    let dlat = (north_m / EARTH_RADIUS_M).to_degrees();
    let cos_lat = point.lat.to_radians().cos().max(1e-6);
    let dlng = (east_m / (EARTH_RADIUS_M * cos_lat)).to_degrees();
    LatLng::new(point.lat + dlat, point.lng + dlng)
}

/// Fixes a walker would report following `route`, dwelling at each stop.
///
/// Stops are visited in order; each is inserted at the first sample that
/// reaches it, repeated `dwell_fixes + 1` times without jitter.
pub fn build_walk(route: &[LatLng], stops: &[LatLng], config: &WalkConfig) -> Vec<LatLng> {
    let samples = if route.len() >= 2 {
        resample(route, config.step_m.max(0.5))
    } else {
        stops.to_vec()
    };

    let mut rng = StdRng::seed_from_u64(config.seed);
    let jitter = config.jitter_m.abs();
    let mut fixes = Vec::with_capacity(samples.len() + stops.len() * (config.dwell_fixes + 1));
    let mut next_stop = 0;

    for sample in samples {
        let (north, east) = if jitter > 0.0 {
            (rng.gen_range(-jitter..=jitter), rng.gen_range(-jitter..=jitter))
        } else {
            (0.0, 0.0)
        };
        fixes.push(offset_meters(sample, north, east));

        while let Some(stop) = stops.get(next_stop) {
            if distance_meters(sample, *stop) > config.step_m.max(0.5) {
                break;
            }
            fixes.extend(std::iter::repeat(*stop).take(config.dwell_fixes + 1));
            next_stop += 1;
        }
    }

    // stops the route never came close to are walked to directly
    for stop in stops.iter().skip(next_stop) {
        fixes.extend(std::iter::repeat(*stop).take(config.dwell_fixes + 1));
    }
    fixes
}
