// ─── Asset Index ───
// Sounds, textures and language files referenced by a version's asset
// index. Objects are stored content-addressed as `objects/<hh>/<hash>`.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::warn;

use super::FetchEntry;
use crate::core::error::{LauncherError, LauncherResult};

const RESOURCES_URL: &str = "https://resources.download.minecraft.net";

/// Top-level asset index JSON structure.
#[derive(Debug, Deserialize)]
pub struct AssetIndex {
    #[serde(default)]
    pub objects: HashMap<String, AssetObject>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AssetObject {
    pub hash: String,
    pub size: u64,
}

/// `<assets>/indexes/<id>.json`
pub fn index_path(assets_dir: &Path, index_id: &str) -> PathBuf {
    assets_dir.join("indexes").join(format!("{}.json", index_id))
}

/// `<assets>/objects/<first two hash chars>/<hash>`
pub fn object_path(assets_dir: &Path, hash: &str) -> PathBuf {
    assets_dir.join("objects").join(&hash[..2]).join(hash)
}

impl AssetIndex {
    pub async fn load(path: &Path) -> LauncherResult<Self> {
        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| LauncherError::io(path, e))?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// One fetch entry per distinct object, in hash order.
    pub fn object_entries(&self, assets_dir: &Path) -> Vec<FetchEntry> {
        let mut by_hash: BTreeMap<&str, &AssetObject> = BTreeMap::new();
        for (name, object) in &self.objects {
            let valid = object.hash.len() == 40 && object.hash.chars().all(|c| c.is_ascii_hexdigit());
            if !valid {
                warn!("Skipping asset {} with malformed hash {:?}", name, object.hash);
                continue;
            }
            by_hash.insert(object.hash.as_str(), object);
        }

        by_hash
            .into_values()
            .map(|object| {
                let prefix = &object.hash[..2];
                FetchEntry {
                    url: Some(format!("{}/{}/{}", RESOURCES_URL, prefix, object.hash)),
                    dest: object_path(assets_dir, &object.hash),
                    sha1: Some(object.hash.clone()),
                    size: Some(object.size),
                }
            })
            .collect()
    }
}
