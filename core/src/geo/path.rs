use super::distance::distance_meters;
use super::LatLng;

/// Orthogonal projection of a point onto a segment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SegmentProjection {
    pub point: LatLng,
    /// Position along the segment, clamped to `[0, 1]`.
    pub t: f64,
}

/// Re-samples `path` so that consecutive points are `interval_m` apart along
/// the path. The final point of the input is always emitted as-is.
pub fn resample(path: &[LatLng], interval_m: f64) -> Vec<LatLng> {
    if path.len() < 2 || !interval_m.is_finite() || interval_m <= 0.0 {
        return path.to_vec();
    }

    let mut samples = vec![path[0]];
    // distance walked since the last emitted sample
    let mut carried = 0.0;

    for pair in path.windows(2) {
        let (start, end) = (pair[0], pair[1]);
        let segment_len = distance_meters(start, end);
        if segment_len <= 0.0 {
            continue;
        }

        let mut next = interval_m - carried;
        while next <= segment_len {
            let t = next / segment_len;
            samples.push(if t >= 1.0 { end } else { start.lerp(end, t) });
            next += interval_m;
        }
        carried = segment_len - (next - interval_m);
    }

    let last = path[path.len() - 1];
    if samples.last() != Some(&last) {
        samples.push(last);
    }
    samples
}

/// Projects `point` onto the segment `[a, b]`, treating degrees as planar
/// coordinates. Only meant for the short distances between route samples.
pub fn project_onto_segment(point: LatLng, a: LatLng, b: LatLng) -> SegmentProjection {
    let dx = b.lng - a.lng;
    let dy = b.lat - a.lat;
    let length_sq = dx * dx + dy * dy;
    if length_sq == 0.0 {
        return SegmentProjection { point: a, t: 0.0 };
    }

    let t = (((point.lng - a.lng) * dx + (point.lat - a.lat) * dy) / length_sq).clamp(0.0, 1.0);
    SegmentProjection {
        point: a.lerp(b, t),
        t,
    }
}
