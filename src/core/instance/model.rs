use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

/// Instance descriptor persisted as `<root>/instance.json`.
///
/// The instance root doubles as the game's working directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Instance {
    pub id: String,
    pub name: String,
    pub path: PathBuf,
    /// Leaf version descriptor id (e.g. `1.20.1-forge-47.2.0`).
    pub version_id: String,
    #[serde(default)]
    pub java_path: Option<PathBuf>,
    pub max_memory_mb: u32,
    #[serde(default = "default_min_memory")]
    pub min_memory_mb: u32,
    #[serde(default)]
    pub resolution: Option<Resolution>,
    /// Feature flags switched on for rule evaluation.
    #[serde(default)]
    pub features: Vec<String>,
    /// Extra JVM arguments (templated like descriptor arguments).
    #[serde(default)]
    pub jvm_args: Vec<String>,
    /// Extra program arguments.
    #[serde(default)]
    pub game_args: Vec<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub last_played: Option<DateTime<Utc>>,
}

fn default_min_memory() -> u32 {
    512
}

impl Instance {
    pub fn new(name: String, version_id: String, max_memory_mb: u32, base_dir: &Path) -> Self {
        let id = Uuid::new_v4().to_string();
        let path = base_dir.join(&id);

        Self {
            id,
            name,
            path,
            version_id,
            java_path: None,
            max_memory_mb,
            min_memory_mb: default_min_memory(),
            resolution: None,
            features: Vec::new(),
            jvm_args: Vec::new(),
            game_args: Vec::new(),
            created_at: Utc::now(),
            last_played: None,
        }
    }

    pub fn game_dir(&self) -> PathBuf {
        self.path.clone()
    }

    pub fn config_path(&self) -> PathBuf {
        self.path.join("instance.json")
    }

    /// Feature set implied by the instance settings plus explicit flags.
    pub fn active_features(&self) -> Vec<String> {
        let mut features = self.features.clone();
        if self.resolution.is_some() && !features.iter().any(|f| f == "has_custom_resolution") {
            features.push("has_custom_resolution".into());
        }
        features
    }
}
