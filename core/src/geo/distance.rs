use super::LatLng;

/// Mean Earth radius used by the haversine formula.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Great-circle distance between two coordinates in meters.
pub fn distance_meters(p1: LatLng, p2: LatLng) -> f64 {
    let lat1 = p1.lat.to_radians();
    let lat2 = p2.lat.to_radians();
    let dlat = (p2.lat - p1.lat).to_radians();
    let dlng = (p2.lng - p1.lng).to_radians();

    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlng / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * h.sqrt().min(1.0).asin()
}

/// Sum of segment lengths along a path.
pub fn path_length_meters(path: &[LatLng]) -> f64 {
    path.windows(2)
        .map(|pair| distance_meters(pair[0], pair[1]))
        .sum()
}
