use crate::generator::walk::WalkConfig;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tourcore::NavigationConfig;

pub const DIRECTIONS_KEY_ENV: &str = "GOOGLE_MAPS_API_KEY";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PointConfig {
    #[serde(default)]
    pub name: Option<String>,
    pub lat: f64,
    pub lng: f64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowConfig {
    pub tour_name: String,
    pub guide_personality: String,
    pub user_preferences: String,
    pub points: Vec<PointConfig>,
    pub backend_url: Option<String>,
    pub directions_key: Option<String>,
    /// Asked at the first stop during a replayed walk.
    pub follow_up_question: Option<String>,
    pub walk: WalkConfig,
    pub navigation: NavigationConfig,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            tour_name: "Harbour loop".into(),
            guide_personality: "friendly local historian".into(),
            user_preferences: "architecture, food".into(),
            points: vec![
                PointConfig {
                    name: Some("Clock Tower".into()),
                    lat: 32.05466,
                    lng: 34.75636,
                },
                PointConfig {
                    name: Some("Flea Market".into()),
                    lat: 32.05385,
                    lng: 34.75801,
                },
                PointConfig {
                    name: None,
                    lat: 32.05300,
                    lng: 34.75420,
                },
                PointConfig {
                    name: Some("Old Port".into()),
                    lat: 32.05240,
                    lng: 34.75220,
                },
            ],
            backend_url: None,
            directions_key: None,
            follow_up_question: Some("Who built this?".into()),
            walk: WalkConfig::default(),
            navigation: NavigationConfig::default(),
        }
    }
}

impl WorkflowConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path_ref = path.as_ref();
        let contents = fs::read_to_string(path_ref)
            .with_context(|| format!("reading workflow config {}", path_ref.display()))?;
        let config: WorkflowConfig = serde_yaml::from_str(&contents)
            .with_context(|| format!("parsing workflow config {}", path_ref.display()))?;
        Ok(config)
    }

    pub fn from_args(backend_url: Option<String>, directions_key: Option<String>) -> Self {
        let mut config = Self::default();
        config.apply_overrides(backend_url, directions_key);
        config
    }

    /// Command line values win over the file.
    pub fn apply_overrides(&mut self, backend_url: Option<String>, directions_key: Option<String>) {
        if backend_url.is_some() {
            self.backend_url = backend_url;
        }
        if directions_key.is_some() {
            self.directions_key = directions_key;
        }
    }

    /// Configured key, falling back to the environment.
    pub fn resolved_directions_key(&self) -> Option<String> {
        self.directions_key
            .clone()
            .or_else(|| std::env::var(DIRECTIONS_KEY_ENV).ok())
            .filter(|key| !key.trim().is_empty())
    }
}
