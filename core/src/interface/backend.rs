use crate::prelude::{TourError, TourResult};
use crate::tour::{ContentNugget, Tour, TourDraft};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Backend acknowledgement of a follow-up question.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FollowUpReceipt {
    #[serde(default)]
    pub nugget: Option<ContentNugget>,
    #[serde(default, alias = "nuggetId")]
    pub nugget_id: Option<String>,
}

impl FollowUpReceipt {
    /// Id under which the answer will show up in polled content, if known.
    pub fn resolved_id(&self) -> Option<&str> {
        self.nugget_id
            .as_deref()
            .or_else(|| self.nugget.as_ref().map(|nugget| nugget.id.as_str()))
            .filter(|id| !id.is_empty())
    }
}

/// Tour persistence and content generation service.
#[async_trait]
pub trait TourBackend: Send + Sync {
    async fn list_tours(&self) -> TourResult<Vec<Tour>>;
    async fn get_tour(&self, tour_id: &str) -> TourResult<Tour>;
    async fn create_tour(&self, draft: TourDraft) -> TourResult<Tour>;
    async fn post_follow_up(
        &self,
        tour_id: &str,
        waypoint_name: &str,
        question: &str,
    ) -> TourResult<FollowUpReceipt>;
}

fn tour_from_value(value: Value) -> TourResult<Tour> {
    let parsed = match value {
        Value::String(raw) => serde_json::from_str(&raw),
        other => serde_json::from_value(other),
    };
    parsed.map_err(|err| TourError::Backend(format!("malformed tour: {}", err)))
}

/// Normalizes the shapes the backend uses for tour listings: a `results` map,
/// a bare array, or an object keyed by tour id. Entries may be stringified.
pub fn parse_tour_list(value: Value) -> TourResult<Vec<Tour>> {
    let entries = match value {
        Value::Object(mut map) => match map.remove("results") {
            Some(Value::Object(results)) => results.into_iter().map(|(_, v)| v).collect(),
            Some(Value::Array(results)) => results,
            Some(_) => {
                return Err(TourError::Backend(
                    "unexpected results format in tour listing".into(),
                ))
            }
            None => map.into_iter().map(|(_, v)| v).collect(),
        },
        Value::Array(items) => items,
        _ => return Err(TourError::Backend("unexpected tour listing format".into())),
    };
    entries.into_iter().map(tour_from_value).collect()
}

/// Normalizes a single-tour response: a stringified tour, a bare tour, or a
/// tour wrapped in a `tour` field.
pub fn parse_tour(value: Value) -> TourResult<Tour> {
    match value {
        Value::String(_) => tour_from_value(value),
        Value::Object(mut map) => {
            if map.contains_key("tour_id") {
                tour_from_value(Value::Object(map))
            } else if let Some(inner) = map.remove("tour") {
                tour_from_value(inner)
            } else {
                Err(TourError::Backend("unexpected response format".into()))
            }
        }
        _ => Err(TourError::Backend("unexpected response format".into())),
    }
}
