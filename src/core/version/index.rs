// ─── Version Index ───
// Lookup of version descriptors by id: in-memory, or local-first with a
// remote manifest fallback.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info};

use super::descriptor::VersionDescriptor;
use crate::core::error::{LauncherError, LauncherResult};

pub const VERSION_MANIFEST_URL: &str =
    "https://piston-meta.mojang.com/mc/game/version_manifest_v2.json";

/// Resolves a descriptor by id. `Ok(None)` means "unknown id".
#[async_trait]
pub trait VersionIndex: Send + Sync {
    async fn lookup(&self, id: &str) -> LauncherResult<Option<VersionDescriptor>>;
}

/// Map-backed index, used for embedding and tests.
#[derive(Debug, Default, Clone)]
pub struct MapVersionIndex {
    versions: HashMap<String, VersionDescriptor>,
}

impl MapVersionIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, descriptor: VersionDescriptor) {
        self.versions.insert(descriptor.id.clone(), descriptor);
    }

    pub fn with(mut self, descriptor: VersionDescriptor) -> Self {
        self.insert(descriptor);
        self
    }
}

#[async_trait]
impl VersionIndex for MapVersionIndex {
    async fn lookup(&self, id: &str) -> LauncherResult<Option<VersionDescriptor>> {
        Ok(self.versions.get(id).cloned())
    }
}

/// Top-level Mojang version manifest.
#[derive(Debug, Deserialize)]
pub struct VersionManifest {
    pub versions: Vec<VersionEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VersionEntry {
    pub id: String,
    #[serde(rename = "type")]
    pub version_type: String,
    pub url: String,
}

impl VersionManifest {
    pub async fn fetch(client: &reqwest::Client, url: &str) -> LauncherResult<Self> {
        info!("Fetching version manifest from {}", url);
        let response = client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(LauncherError::DownloadFailed {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        let manifest: VersionManifest = response.json().await?;
        info!("Loaded {} versions from manifest", manifest.versions.len());
        Ok(manifest)
    }

    pub fn find_version(&self, id: &str) -> Option<&VersionEntry> {
        self.versions.iter().find(|v| v.id == id)
    }
}

/// Reads `<versions_dir>/<id>/<id>.json`. When a descriptor is missing
/// locally and a remote is configured, it is looked up in the manifest,
/// downloaded and cached next to the local ones.
pub struct LocalFirstVersionIndex {
    versions_dir: PathBuf,
    remote: Option<RemoteManifest>,
}

struct RemoteManifest {
    client: reqwest::Client,
    manifest_url: String,
}

impl LocalFirstVersionIndex {
    pub fn new(versions_dir: impl Into<PathBuf>) -> Self {
        Self {
            versions_dir: versions_dir.into(),
            remote: None,
        }
    }

    pub fn with_remote(mut self, client: reqwest::Client, manifest_url: impl Into<String>) -> Self {
        self.remote = Some(RemoteManifest {
            client,
            manifest_url: manifest_url.into(),
        });
        self
    }

    pub fn descriptor_path(&self, id: &str) -> PathBuf {
        self.versions_dir.join(id).join(format!("{}.json", id))
    }

    async fn read_local(&self, path: &Path) -> LauncherResult<Option<VersionDescriptor>> {
        match tokio::fs::read_to_string(path).await {
            Ok(raw) => Ok(Some(VersionDescriptor::from_json(&raw)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(LauncherError::io(path, e)),
        }
    }

    async fn fetch_remote(
        &self,
        remote: &RemoteManifest,
        id: &str,
    ) -> LauncherResult<Option<VersionDescriptor>> {
        let manifest = VersionManifest::fetch(&remote.client, &remote.manifest_url).await?;
        let Some(entry) = manifest.find_version(id) else {
            return Ok(None);
        };

        let raw = remote
            .client
            .get(&entry.url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        let descriptor = VersionDescriptor::from_json(&raw)?;

        let path = self.descriptor_path(id);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| LauncherError::io(parent, e))?;
        }
        tokio::fs::write(&path, raw)
            .await
            .map_err(|e| LauncherError::io(&path, e))?;
        debug!("Cached version descriptor {} at {:?}", id, path);

        Ok(Some(descriptor))
    }
}

#[async_trait]
impl VersionIndex for LocalFirstVersionIndex {
    async fn lookup(&self, id: &str) -> LauncherResult<Option<VersionDescriptor>> {
        let path = self.descriptor_path(id);
        if let Some(local) = self.read_local(&path).await? {
            return Ok(Some(local));
        }

        match &self.remote {
            Some(remote) => self.fetch_remote(remote, id).await,
            None => Ok(None),
        }
    }
}
