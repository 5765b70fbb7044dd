use async_trait::async_trait;
use log::debug;
use serde::Deserialize;
use tourcore::geo::{distance_meters, PolylineCodec};
use tourcore::interface::{
    DirectionsProvider, DirectionsRequest, DirectionsResponse, RouteLeg, TravelMode, STATUS_OK,
};
use tourcore::{LatLng, TourError, TourResult};

const GOOGLE_DIRECTIONS_URL: &str = "https://maps.googleapis.com/maps/api/directions/json";
const WALKING_SPEED_MPS: f64 = 1.4;

#[derive(Debug, Deserialize)]
struct GoogleBody {
    status: String,
    #[serde(default)]
    routes: Vec<GoogleRoute>,
}

#[derive(Debug, Deserialize)]
struct GoogleRoute {
    #[serde(default)]
    waypoint_order: Vec<usize>,
    overview_polyline: GooglePolyline,
    #[serde(default)]
    legs: Vec<GoogleLeg>,
}

#[derive(Debug, Deserialize)]
struct GooglePolyline {
    points: String,
}

#[derive(Debug, Deserialize)]
struct GoogleLeg {
    distance: GoogleValue,
    duration: GoogleValue,
}

#[derive(Debug, Deserialize)]
struct GoogleValue {
    value: f64,
}

fn format_point(point: LatLng) -> String {
    format!("{},{}", point.lat, point.lng)
}

/// Translates a Directions API body into what the route model consumes.
fn parse_google_body(body: GoogleBody) -> DirectionsResponse {
    if body.status != STATUS_OK {
        return DirectionsResponse::failed(body.status);
    }
    match body.routes.into_iter().next() {
        Some(route) => DirectionsResponse {
            status: body.status,
            waypoint_order: route.waypoint_order,
            overview_polyline: route.overview_polyline.points,
            legs: route
                .legs
                .into_iter()
                .map(|leg| RouteLeg {
                    distance_m: leg.distance.value,
                    duration_s: leg.duration.value,
                })
                .collect(),
        },
        None => DirectionsResponse::failed("ZERO_RESULTS"),
    }
}

/// Google Directions web service over HTTP.
pub struct GoogleDirections {
    client: reqwest::Client,
    api_key: String,
}

impl GoogleDirections {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
        }
    }

    fn query(&self, request: &DirectionsRequest) -> Vec<(&'static str, String)> {
        let mode = match request.travel_mode {
            TravelMode::Walking => "walking",
            TravelMode::Driving => "driving",
        };
        let mut query = vec![
            ("origin", format_point(request.origin)),
            ("destination", format_point(request.destination)),
            ("mode", mode.to_string()),
            ("key", self.api_key.clone()),
        ];
        if !request.intermediates.is_empty() {
            let mut waypoints: Vec<String> =
                request.intermediates.iter().copied().map(format_point).collect();
            if request.optimize {
                waypoints.insert(0, "optimize:true".into());
            }
            query.push(("waypoints", waypoints.join("|")));
        }
        query
    }
}

#[async_trait]
impl DirectionsProvider for GoogleDirections {
    async fn route(&self, request: DirectionsRequest) -> TourResult<DirectionsResponse> {
        let response = self
            .client
            .get(GOOGLE_DIRECTIONS_URL)
            .query(&self.query(&request))
            .send()
            .await
            .map_err(|err| TourError::Directions(err.to_string()))?;
        let body: GoogleBody = response
            .error_for_status()
            .map_err(|err| TourError::Directions(err.to_string()))?
            .json()
            .await
            .map_err(|err| TourError::Directions(format!("malformed response: {}", err)))?;
        Ok(parse_google_body(body))
    }
}

/// Offline provider: orders intermediates greedily by distance and joins the
/// stops with straight segments.
#[derive(Debug, Default, Clone)]
pub struct StraightLineDirections;

fn nearest_neighbour_order(origin: LatLng, points: &[LatLng]) -> Vec<usize> {
    let mut remaining: Vec<usize> = (0..points.len()).collect();
    let mut order = Vec::with_capacity(points.len());
    let mut here = origin;
    while !remaining.is_empty() {
        let (slot, _) = remaining
            .iter()
            .enumerate()
            .map(|(slot, &idx)| (slot, distance_meters(here, points[idx])))
            .fold((0, f64::INFINITY), |best, candidate| {
                if candidate.1 < best.1 {
                    candidate
                } else {
                    best
                }
            });
        let idx = remaining.remove(slot);
        here = points[idx];
        order.push(idx);
    }
    order
}

#[async_trait]
impl DirectionsProvider for StraightLineDirections {
    async fn route(&self, request: DirectionsRequest) -> TourResult<DirectionsResponse> {
        let order = if request.optimize {
            nearest_neighbour_order(request.origin, &request.intermediates)
        } else {
            (0..request.intermediates.len()).collect()
        };

        let mut stops = Vec::with_capacity(request.intermediates.len() + 2);
        stops.push(request.origin);
        stops.extend(order.iter().map(|&idx| request.intermediates[idx]));
        stops.push(request.destination);

        let legs = stops
            .windows(2)
            .map(|pair| {
                let distance_m = distance_meters(pair[0], pair[1]);
                RouteLeg {
                    distance_m,
                    duration_s: distance_m / WALKING_SPEED_MPS,
                }
            })
            .collect();
        debug!("straight-line route through {} stops", stops.len());

        Ok(DirectionsResponse {
            status: STATUS_OK.into(),
            waypoint_order: order,
            overview_polyline: PolylineCodec::encode(&stops),
            legs,
        })
    }
}
