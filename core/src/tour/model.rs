use crate::geo::LatLng;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_WAYPOINT_ID: AtomicU64 = AtomicU64::new(1);

/// Client-side identity of a waypoint, assigned when the waypoint is created
/// or received. Never sent to the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct WaypointId(u64);

impl WaypointId {
    pub fn next() -> Self {
        Self(NEXT_WAYPOINT_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl Default for WaypointId {
    fn default() -> Self {
        Self::next()
    }
}

/// A unit of generated content attached to a waypoint.
///
/// `content[0]` of a waypoint is its main description; later entries are
/// follow-up answers.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ContentNugget {
    #[serde(default)]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_path: Option<String>,
    #[serde(default)]
    pub ready: bool,
}

impl ContentNugget {
    /// Local stand-in for a follow-up that the backend accepted but has not
    /// answered yet.
    pub fn pending_follow_up(id: impl Into<String>, question: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            question: Some(question.into()),
            answer: None,
            audio_path: None,
            ready: false,
        }
    }

    /// Audio path of a nugget that is ready to be played.
    pub fn playable_audio(&self) -> Option<&str> {
        if self.ready {
            self.audio_path.as_deref().filter(|path| !path.is_empty())
        } else {
            None
        }
    }
}

/// A stop on the tour, in wire form as the backend's `points` entries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Waypoint {
    #[serde(skip)]
    pub id: WaypointId,
    #[serde(rename = "location")]
    pub name: String,
    #[serde(rename = "latitude")]
    pub lat: f64,
    #[serde(rename = "longitude")]
    pub lng: f64,
    #[serde(default)]
    pub visited: bool,
    #[serde(default)]
    pub content: Vec<ContentNugget>,
}

impl Waypoint {
    pub fn new(name: impl Into<String>, lat: f64, lng: f64) -> Self {
        Self {
            id: WaypointId::next(),
            name: name.into(),
            lat,
            lng,
            visited: false,
            content: Vec::new(),
        }
    }

    pub fn position(&self) -> LatLng {
        LatLng::new(self.lat, self.lng)
    }

    pub fn key(&self) -> WaypointKey {
        WaypointKey {
            name: self.name.clone(),
            lat: self.lat,
            lng: self.lng,
        }
    }

    pub fn main_content(&self) -> Option<&ContentNugget> {
        self.content.first()
    }

    /// True once the backend has produced at least one nugget and none are
    /// still pending.
    pub fn content_complete(&self) -> bool {
        !self.content.is_empty() && self.content.iter().all(|nugget| nugget.ready)
    }

    /// Structural match used to pair backend waypoints with local ones.
    pub fn matches(&self, other: &Waypoint, epsilon_deg: f64) -> bool {
        self.name == other.name
            && (self.lat - other.lat).abs() <= epsilon_deg
            && (self.lng - other.lng).abs() <= epsilon_deg
    }
}

/// Snapshot of the fields that determine a route: name and exact position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaypointKey {
    pub name: String,
    pub lat: f64,
    pub lng: f64,
}

pub fn route_keys(waypoints: &[Waypoint]) -> Vec<WaypointKey> {
    waypoints.iter().map(Waypoint::key).collect()
}

/// Name given to a point whose place lookup produced nothing usable.
pub fn placeholder_name(lat: f64, lng: f64) -> String {
    format!("Lat {:.4}, Lng {:.4}", lat, lng)
}

/// A tour as persisted by the backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tour {
    #[serde(rename = "tour_id")]
    pub id: String,
    #[serde(rename = "tour_name", default)]
    pub name: String,
    #[serde(rename = "tour_guide_personality", default)]
    pub guide_personality: String,
    #[serde(default)]
    pub user_preferences: String,
    #[serde(rename = "points", default)]
    pub waypoints: Vec<Waypoint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_output_dir: Option<String>,
}

impl Tour {
    pub fn summary(&self) -> TourSummary {
        TourSummary {
            id: self.id.clone(),
            name: self.name.clone(),
            waypoint_count: self.waypoints.len(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TourSummary {
    pub id: String,
    pub name: String,
    pub waypoint_count: usize,
}

/// Payload for creating a tour. Waypoints are sent without content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TourDraft {
    pub tour_name: String,
    pub tour_guide_personality: String,
    pub user_preferences: String,
    pub points: Vec<WaypointDraft>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaypointDraft {
    pub location: String,
    pub latitude: f64,
    pub longitude: f64,
}

impl From<&Waypoint> for WaypointDraft {
    fn from(waypoint: &Waypoint) -> Self {
        Self {
            location: waypoint.name.clone(),
            latitude: waypoint.lat,
            longitude: waypoint.lng,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn waypoint_reads_backend_point_shape() {
        let json = r#"{
            "location": "Old Port",
            "latitude": 32.05,
            "longitude": 34.75,
            "content": [{"id": "n1", "ready": true, "audio_path": "audio/port.mp3"}]
        }"#;
        let waypoint: Waypoint = serde_json::from_str(json).unwrap();
        assert_eq!(waypoint.name, "Old Port");
        assert!(!waypoint.visited);
        assert_eq!(
            waypoint.main_content().and_then(ContentNugget::playable_audio),
            Some("audio/port.mp3")
        );
    }

    #[test]
    fn deserialized_waypoints_get_distinct_ids() {
        let json = r#"{"location": "A", "latitude": 0.0, "longitude": 0.0}"#;
        let first: Waypoint = serde_json::from_str(json).unwrap();
        let second: Waypoint = serde_json::from_str(json).unwrap();
        assert_ne!(first.id, second.id);
    }

    #[test]
    fn content_complete_requires_ready_nuggets() {
        let mut waypoint = Waypoint::new("A", 0.0, 0.0);
        assert!(!waypoint.content_complete());
        waypoint.content.push(ContentNugget {
            id: "main".into(),
            ready: true,
            ..Default::default()
        });
        assert!(waypoint.content_complete());
        waypoint
            .content
            .push(ContentNugget::pending_follow_up("q1", "Who built it?"));
        assert!(!waypoint.content_complete());
    }

    #[test]
    fn unready_audio_is_not_playable() {
        let nugget = ContentNugget {
            audio_path: Some("audio/a.mp3".into()),
            ready: false,
            ..Default::default()
        };
        assert_eq!(nugget.playable_audio(), None);
    }

    #[test]
    fn matching_tolerates_small_drift_only() {
        let local = Waypoint::new("Market", 32.0, 34.0);
        let drifted = Waypoint::new("Market", 32.00005, 34.00005);
        let far = Waypoint::new("Market", 32.001, 34.0);
        let renamed = Waypoint::new("Bazaar", 32.0, 34.0);
        assert!(local.matches(&drifted, 1e-4));
        assert!(!local.matches(&far, 1e-4));
        assert!(!local.matches(&renamed, 1e-4));
    }

    #[test]
    fn placeholder_name_uses_four_decimals() {
        assert_eq!(placeholder_name(32.08531, 34.78182), "Lat 32.0853, Lng 34.7818");
    }

    #[test]
    fn draft_drops_content() {
        let mut waypoint = Waypoint::new("A", 1.0, 2.0);
        waypoint.content.push(ContentNugget::default());
        let draft = WaypointDraft::from(&waypoint);
        let json = serde_json::to_value(&draft).unwrap();
        assert!(json.get("content").is_none());
        assert_eq!(json["location"], "A");
    }
}
