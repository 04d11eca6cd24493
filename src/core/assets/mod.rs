// ─── Asset Fetching ───
// The launch pipeline only states which files must exist before spawn.
// How they get there (network, cache, checksum policy) belongs to the
// `AssetFetcher` implementation.

pub mod asset_index;
mod http_fetcher;

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::core::error::{LauncherError, LauncherResult};
use crate::core::launch::CollectedLibrary;
use crate::core::version::{AssetIndexInfo, DownloadArtifact};

pub use asset_index::{index_path, object_path, AssetIndex, AssetObject};
pub use http_fetcher::HttpFetcher;

/// A file that must be present before launch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchEntry {
    /// Where to get it. `None` means it must already be on disk.
    pub url: Option<String>,
    pub dest: PathBuf,
    pub sha1: Option<String>,
    pub size: Option<u64>,
}

#[derive(Debug, Clone, Default)]
pub struct FetchRequest {
    pub entries: Vec<FetchEntry>,
}

impl FetchRequest {
    /// Every collected library (classpath and native) plus the game jar.
    /// Without a `client` download the jar must already be on disk.
    pub fn for_launch(
        libraries: &[CollectedLibrary],
        libraries_dir: &Path,
        game_jar: &Path,
        client: Option<&DownloadArtifact>,
    ) -> Self {
        let mut entries: Vec<FetchEntry> = libraries
            .iter()
            .map(|lib| FetchEntry {
                url: lib.url.clone(),
                dest: libraries_dir.join(&lib.path),
                sha1: lib.sha1.clone(),
                size: None,
            })
            .collect();
        entries.push(FetchEntry {
            url: client.map(|c| c.url.clone()),
            dest: game_jar.to_path_buf(),
            sha1: client.map(|c| c.sha1.clone()),
            size: client.map(|c| c.size),
        });
        Self { entries }
    }

    /// Add the asset index file itself. Its objects are requested once the
    /// index is on disk.
    pub fn with_asset_index(mut self, info: &AssetIndexInfo, assets_dir: &Path) -> Self {
        self.entries.push(FetchEntry {
            url: info.url.clone(),
            dest: index_path(assets_dir, &info.id),
            sha1: info.sha1.clone(),
            size: info.size,
        });
        self
    }

    pub fn total_bytes(&self) -> Option<u64> {
        self.entries.iter().map(|e| e.size).sum()
    }
}

/// Progress of an `ensure` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchProgress {
    pub completed: usize,
    pub total: usize,
    pub bytes_done: u64,
    pub bytes_total: Option<u64>,
}

impl FetchProgress {
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            return 1.0;
        }
        self.completed as f64 / self.total as f64
    }
}

pub type ProgressFn<'a> = &'a (dyn Fn(FetchProgress) + Send + Sync);

/// Makes sure every requested file is on disk.
#[async_trait]
pub trait AssetFetcher: Send + Sync {
    async fn ensure(&self, request: &FetchRequest, progress: ProgressFn<'_>) -> LauncherResult<()>;
}

/// Offline fetcher: only checks that the files already exist.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFileCheck;

#[async_trait]
impl AssetFetcher for LocalFileCheck {
    async fn ensure(&self, request: &FetchRequest, progress: ProgressFn<'_>) -> LauncherResult<()> {
        let total = request.entries.len();
        let mut bytes_done = 0;
        for (i, entry) in request.entries.iter().enumerate() {
            let meta = tokio::fs::metadata(&entry.dest).await.map_err(|_| {
                LauncherError::Preparation(format!("missing file {:?}", entry.dest))
            })?;
            bytes_done += meta.len();
            progress(FetchProgress {
                completed: i + 1,
                total,
                bytes_done,
                bytes_total: request.total_bytes(),
            });
        }
        Ok(())
    }
}
