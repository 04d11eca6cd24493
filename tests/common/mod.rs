#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;

use interface_launch::core::launch::{ChannelObserver, LaunchEvent};
use interface_launch::core::version::{MapVersionIndex, VersionDescriptor};
use interface_launch::{
    IdentityProvider, Instance, JsonInstanceStore, LaunchServices, LauncherConfig,
    LocalFileCheck, OfflineIdentity, ProcessSupervisor,
};
use tempfile::TempDir;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};

pub struct Fixture {
    pub temp: TempDir,
    pub config: LauncherConfig,
    pub store: Arc<JsonInstanceStore>,
    pub instance: Instance,
    pub index: MapVersionIndex,
}

pub fn descriptor(json: serde_json::Value) -> VersionDescriptor {
    VersionDescriptor::from_json(&json.to_string()).unwrap()
}

/// Pre-1.13 style base version with a single library.
pub fn legacy_base(id: &str) -> VersionDescriptor {
    descriptor(serde_json::json!({
        "id": id,
        "type": "release",
        "mainClass": "net.minecraft.client.main.Main",
        "assets": "1.8",
        "minecraftArguments": "--username ${auth_player_name} --version ${version_name} --accessToken ${auth_access_token} --gameDir ${game_directory}",
        "libraries": [
            { "name": "com.google.guava:guava:32.1.2-jre" }
        ]
    }))
}

/// Asset object used by the asset-index fixtures (SHA-1 of `hello`).
pub const ASSET_HASH: &str = "aaf4c61ddcc5e8a2dabede0f3b482cd9aea9434d";

/// Modern base version that references asset index `index_id`.
pub fn base_with_assets(id: &str, index_id: &str) -> VersionDescriptor {
    descriptor(serde_json::json!({
        "id": id,
        "type": "release",
        "mainClass": "net.minecraft.client.main.Main",
        "assetIndex": { "id": index_id, "url": "https://example.invalid/index.json" },
        "arguments": {
            "game": ["--assetIndex", "${assets_index_name}", "--username", "${auth_player_name}"],
            "jvm": ["-cp", "${classpath}"]
        }
    }))
}

/// Child layer of a loader that pins an older guava.
pub fn forge_child(id: &str, base: &str) -> VersionDescriptor {
    descriptor(serde_json::json!({
        "id": id,
        "inheritsFrom": base,
        "mainClass": "cpw.mods.bootstraplauncher.BootstrapLauncher",
        "libraries": [
            { "name": "com.google.guava:guava:31.1-jre" },
            { "name": "net.minecraftforge:fmlloader:1.20.1-47.2.0" }
        ]
    }))
}

impl Fixture {
    /// Data directory with the given versions, every library and game jar
    /// on disk, and one instance pointed at `version_id`.
    pub async fn new(descriptors: Vec<VersionDescriptor>, version_id: &str) -> Self {
        let temp = tempfile::tempdir().unwrap();
        let config = LauncherConfig::with_data_dir(temp.path().join("data"));

        let mut index = MapVersionIndex::new();
        for descriptor in descriptors {
            for library in &descriptor.libraries {
                let artifact = library.coordinate().unwrap();
                touch(&config.libraries_dir().join(artifact.local_path()), b"jar");
            }
            if descriptor.inherits_from.is_none() {
                let id = descriptor.id.clone();
                touch(
                    &config.versions_dir().join(&id).join(format!("{}.jar", id)),
                    b"game",
                );
            }
            index.insert(descriptor);
        }

        let store = Arc::new(JsonInstanceStore::new(config.instances_dir()));
        let instance = store
            .create(Instance::new(
                "Test".into(),
                version_id.into(),
                1024,
                &config.instances_dir(),
            ))
            .await
            .unwrap();

        Self {
            temp,
            config,
            store,
            instance,
            index,
        }
    }

    /// Write asset index `index_id` listing one object, optionally with the
    /// object itself on disk.
    pub fn write_asset_index(&self, index_id: &str, with_object: bool) {
        let assets = self.config.assets_dir();
        let index = serde_json::json!({
            "objects": { "minecraft/sounds/click.ogg": { "hash": ASSET_HASH, "size": 5 } }
        });
        touch(
            &assets.join("indexes").join(format!("{}.json", index_id)),
            index.to_string().as_bytes(),
        );
        if with_object {
            touch(&assets.join("objects").join(&ASSET_HASH[..2]).join(ASSET_HASH), b"hello");
        }
    }

    pub fn path(&self) -> &Path {
        self.temp.path()
    }

    pub fn supervisor(&self) -> ProcessSupervisor {
        self.supervisor_with(Arc::new(OfflineIdentity::new("Steve")))
    }

    pub fn supervisor_with(&self, identity: Arc<dyn IdentityProvider>) -> ProcessSupervisor {
        let services = LaunchServices {
            versions: Arc::new(self.index.clone()),
            fetcher: Arc::new(LocalFileCheck),
            identity,
            instances: self.store.clone(),
        };
        ProcessSupervisor::new(self.config.clone(), services)
    }
}

pub fn observe(supervisor: &ProcessSupervisor) -> UnboundedReceiver<LaunchEvent> {
    let (tx, rx) = unbounded_channel();
    supervisor.add_observer(Arc::new(ChannelObserver::new(tx)));
    rx
}

pub fn drain(rx: &mut UnboundedReceiver<LaunchEvent>) -> Vec<LaunchEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

pub fn touch(path: &Path, contents: &[u8]) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, contents).unwrap();
}
