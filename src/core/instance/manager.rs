use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{info, warn};

use super::model::Instance;
use crate::core::error::{LauncherError, LauncherResult};

/// Persistence for on-disk instance descriptors.
#[async_trait]
pub trait InstanceStore: Send + Sync {
    async fn load(&self, id: &str) -> LauncherResult<Instance>;
    async fn save(&self, instance: &Instance) -> LauncherResult<()>;

    /// Stamp the last-played time after a successful spawn.
    async fn record_launch(&self, id: &str, at: DateTime<Utc>) -> LauncherResult<()> {
        let mut instance = self.load(id).await?;
        instance.last_played = Some(at);
        self.save(&instance).await
    }
}

/// Stores each instance as `<instances_dir>/<id>/instance.json`.
pub struct JsonInstanceStore {
    instances_dir: PathBuf,
}

impl JsonInstanceStore {
    pub fn new(instances_dir: PathBuf) -> Self {
        Self { instances_dir }
    }

    pub fn instances_dir(&self) -> &Path {
        &self.instances_dir
    }

    /// Create the instance root and persist its descriptor.
    pub async fn create(&self, mut instance: Instance) -> LauncherResult<Instance> {
        instance.path = self.instances_dir.join(&instance.id);
        tokio::fs::create_dir_all(&instance.path)
            .await
            .map_err(|e| LauncherError::io(&instance.path, e))?;
        self.save(&instance).await?;

        info!("Created instance '{}' ({})", instance.name, instance.id);
        Ok(instance)
    }

    pub async fn list(&self) -> LauncherResult<Vec<Instance>> {
        let mut instances = Vec::new();
        if !self.instances_dir.exists() {
            return Ok(instances);
        }

        let mut entries = tokio::fs::read_dir(&self.instances_dir)
            .await
            .map_err(|e| LauncherError::io(&self.instances_dir, e))?;

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| LauncherError::io(&self.instances_dir, e))?
        {
            let config_path = entry.path().join("instance.json");
            if !config_path.exists() {
                continue;
            }
            match tokio::fs::read_to_string(&config_path).await {
                Ok(json) => match serde_json::from_str::<Instance>(&json) {
                    Ok(inst) => instances.push(inst),
                    Err(e) => warn!("Corrupt instance.json at {:?}: {}", config_path, e),
                },
                Err(e) => warn!("Cannot read {:?}: {}", config_path, e),
            }
        }

        Ok(instances)
    }
}

#[async_trait]
impl InstanceStore for JsonInstanceStore {
    async fn load(&self, id: &str) -> LauncherResult<Instance> {
        let config_path = self.instances_dir.join(id).join("instance.json");
        let json = match tokio::fs::read_to_string(&config_path).await {
            Ok(json) => json,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(LauncherError::InstanceNotFound(id.to_string()))
            }
            Err(e) => return Err(LauncherError::io(&config_path, e)),
        };
        Ok(serde_json::from_str(&json)?)
    }

    async fn save(&self, instance: &Instance) -> LauncherResult<()> {
        let json = serde_json::to_string_pretty(instance)?;
        let config_path = instance.config_path();

        if let Some(parent) = config_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| LauncherError::io(parent, e))?;
        }

        tokio::fs::write(&config_path, json)
            .await
            .map_err(|e| LauncherError::io(&config_path, e))?;
        Ok(())
    }
}
