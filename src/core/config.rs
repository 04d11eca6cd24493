use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::core::error::{LauncherError, LauncherResult};
use crate::core::launch::DedupRule;
use crate::core::version::index::VERSION_MANIFEST_URL;

const APP_DIR_NAME: &str = "InterfaceLaunch";
const SETTINGS_FILE: &str = "launcher_settings.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LauncherConfig {
    pub data_dir: PathBuf,
    pub launcher_name: String,
    pub launcher_version: String,
    /// Interval between game-output batches.
    pub log_flush_interval_ms: u64,
    /// Minimum spacing between non-final progress notifications.
    pub progress_min_spacing_ms: u64,
    pub default_java: PathBuf,
    /// Appended to the built-in deduplication rules.
    pub extra_dedup_rules: Vec<DedupRule>,
    pub version_manifest_url: String,
}

impl Default for LauncherConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            launcher_name: "InterfaceLaunch".into(),
            launcher_version: env!("CARGO_PKG_VERSION").into(),
            log_flush_interval_ms: 100,
            progress_min_spacing_ms: 250,
            default_java: PathBuf::from("java"),
            extra_dedup_rules: Vec::new(),
            version_manifest_url: VERSION_MANIFEST_URL.into(),
        }
    }
}

impl LauncherConfig {
    /// Defaults rooted at `data_dir` instead of the platform data directory.
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Self::default()
        }
    }

    /// Read `launcher_settings.json` from `data_dir`. Missing or corrupt
    /// files give defaults rooted at `data_dir`.
    pub fn load(data_dir: &Path) -> Self {
        let path = data_dir.join(SETTINGS_FILE);
        let raw = match std::fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(_) => return Self::with_data_dir(data_dir),
        };
        match serde_json::from_str::<Self>(&raw) {
            Ok(mut config) => {
                config.data_dir = data_dir.to_path_buf();
                config
            }
            Err(e) => {
                warn!("Ignoring corrupt {:?}: {}", path, e);
                Self::with_data_dir(data_dir)
            }
        }
    }

    pub fn save(&self) -> LauncherResult<()> {
        std::fs::create_dir_all(&self.data_dir).map_err(|e| LauncherError::io(&self.data_dir, e))?;
        let path = self.data_dir.join(SETTINGS_FILE);
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, json).map_err(|e| LauncherError::io(&path, e))
    }

    pub fn libraries_dir(&self) -> PathBuf {
        self.data_dir.join("libraries")
    }

    pub fn versions_dir(&self) -> PathBuf {
        self.data_dir.join("versions")
    }

    pub fn assets_dir(&self) -> PathBuf {
        self.data_dir.join("assets")
    }

    pub fn natives_dir(&self) -> PathBuf {
        self.data_dir.join("natives")
    }

    pub fn snapshots_dir(&self) -> PathBuf {
        self.data_dir.join("snapshots")
    }

    pub fn instances_dir(&self) -> PathBuf {
        self.data_dir.join("instances")
    }

    pub fn log_flush_interval(&self) -> Duration {
        Duration::from_millis(self.log_flush_interval_ms.max(1))
    }

    pub fn progress_min_spacing(&self) -> Duration {
        Duration::from_millis(self.progress_min_spacing_ms)
    }

    /// Built-in deduplication rules followed by the configured extras.
    pub fn dedup_rules(&self) -> Vec<DedupRule> {
        let mut rules = crate::core::launch::default_dedup_rules();
        rules.extend(self.extra_dedup_rules.iter().cloned());
        rules
    }
}

fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR_NAME)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_gives_defaults_rooted_at_dir() {
        let temp = tempfile::tempdir().unwrap();
        let config = LauncherConfig::load(temp.path());
        assert_eq!(config.data_dir, temp.path());
        assert_eq!(config.natives_dir(), temp.path().join("natives"));
        assert_eq!(config.log_flush_interval(), Duration::from_millis(100));
    }

    #[test]
    fn save_then_load_keeps_settings() {
        let temp = tempfile::tempdir().unwrap();
        let mut config = LauncherConfig::with_data_dir(temp.path());
        config.launcher_name = "Custom".into();
        config.extra_dedup_rules.push(DedupRule::new("quilt"));
        config.save().unwrap();

        let loaded = LauncherConfig::load(temp.path());
        assert_eq!(loaded.launcher_name, "Custom");
        assert_eq!(loaded.dedup_rules().last().map(|r| r.token.as_str()), Some("quilt"));
    }

    #[test]
    fn corrupt_file_falls_back() {
        let temp = tempfile::tempdir().unwrap();
        std::fs::write(temp.path().join(SETTINGS_FILE), "{ not json").unwrap();
        let config = LauncherConfig::load(temp.path());
        assert_eq!(config.launcher_name, "InterfaceLaunch");
    }
}
