// ─── Natives Extraction ───
// Native bundles are unpacked into a fresh directory per launch. Each
// directory carries a `.session` marker naming the launcher process that
// owns it, so directories left behind by a crash can be reaped at startup.

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::collector::CollectedLibrary;
use crate::core::error::{LauncherError, LauncherResult};

pub const SESSION_MARKER: &str = ".session";

/// Owner marker written into every ephemeral natives directory.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionMarker {
    pub pid: u32,
    pub created_at: DateTime<Utc>,
}

impl SessionMarker {
    pub fn current() -> Self {
        Self {
            pid: std::process::id(),
            created_at: Utc::now(),
        }
    }
}

/// `<loader-id>-<nanos>-<short random>`, with the id reduced to path-safe
/// characters.
pub fn ephemeral_dir_name(loader_id: &str) -> String {
    let safe: String = loader_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    let random = Uuid::new_v4().simple().to_string();
    format!("{}-{}-{}", safe, nanos, &random[..8])
}

pub struct NativesExtractor {
    cache_root: PathBuf,
    libraries_dir: PathBuf,
}

impl NativesExtractor {
    pub fn new(cache_root: impl Into<PathBuf>, libraries_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_root: cache_root.into(),
            libraries_dir: libraries_dir.into(),
        }
    }

    pub fn cache_root(&self) -> &Path {
        &self.cache_root
    }

    /// Create a new, uniquely named directory owned by this process.
    pub async fn create_session_dir(&self, loader_id: &str) -> LauncherResult<PathBuf> {
        let dir = self.cache_root.join(ephemeral_dir_name(loader_id));
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| LauncherError::io(&dir, e))?;

        let marker = serde_json::to_string(&SessionMarker::current())?;
        let marker_path = dir.join(SESSION_MARKER);
        tokio::fs::write(&marker_path, marker)
            .await
            .map_err(|e| LauncherError::io(&marker_path, e))?;
        Ok(dir)
    }

    /// Unpack every native library into `dest`. Returns the number of files
    /// written.
    pub async fn extract(&self, libraries: &[CollectedLibrary], dest: &Path) -> LauncherResult<usize> {
        let jobs: Vec<(PathBuf, Vec<String>)> = libraries
            .iter()
            .filter(|lib| lib.is_native())
            .map(|lib| (self.libraries_dir.join(&lib.path), lib.extract_exclude.clone()))
            .collect();
        let dest = dest.to_path_buf();

        tokio::task::spawn_blocking(move || -> LauncherResult<usize> {
            let mut written = 0;
            for (archive, excludes) in &jobs {
                written += extract_archive(archive, &dest, excludes)?;
            }
            info!("Extracted {} native files into {:?}", written, dest);
            Ok(written)
        })
        .await
        .map_err(|e| LauncherError::Preparation(format!("natives extraction task failed: {}", e)))?
    }
}

/// Copy every non-directory entry of `archive` into `dest`, skipping names
/// under any of `excludes`. Entries that would land outside `dest` are
/// rejected.
pub fn extract_archive(archive: &Path, dest: &Path, excludes: &[String]) -> LauncherResult<usize> {
    let file = std::fs::File::open(archive).map_err(|e| LauncherError::io(archive, e))?;
    let mut zip = zip::ZipArchive::new(file)?;
    let mut written = 0;

    for index in 0..zip.len() {
        let mut entry = zip.by_index(index)?;
        if entry.is_dir() {
            continue;
        }

        let name = entry.name().to_string();
        if excludes.iter().any(|prefix| name.starts_with(prefix.as_str())) {
            continue;
        }

        let Some(relative) = entry.enclosed_name() else {
            return Err(LauncherError::Preparation(format!(
                "native archive {:?} contains unsafe entry {:?}",
                archive, name
            )));
        };

        let out_path = dest.join(relative);
        if let Some(parent) = out_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| LauncherError::io(parent, e))?;
        }
        let mut out = std::fs::File::create(&out_path).map_err(|e| LauncherError::io(&out_path, e))?;
        std::io::copy(&mut entry, &mut out).map_err(|e| LauncherError::io(&out_path, e))?;
        written += 1;
    }

    debug!("Extracted {} entries from {:?}", written, archive);
    Ok(written)
}

/// Delete natives directories whose owner process is gone, or whose marker
/// is missing or unreadable. Returns the number of directories removed.
pub fn reap_orphaned(cache_root: &Path) -> LauncherResult<usize> {
    let entries = match std::fs::read_dir(cache_root) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(LauncherError::io(cache_root, e)),
    };

    let system = sysinfo::System::new_all();

    let mut reaped = 0;
    for entry in entries.flatten() {
        let dir = entry.path();
        if !dir.is_dir() {
            continue;
        }

        let owner_alive = std::fs::read_to_string(dir.join(SESSION_MARKER))
            .ok()
            .and_then(|raw| serde_json::from_str::<SessionMarker>(&raw).ok())
            .map(|marker| system.process(sysinfo::Pid::from_u32(marker.pid)).is_some())
            .unwrap_or(false);
        if owner_alive {
            continue;
        }

        match std::fs::remove_dir_all(&dir) {
            Ok(()) => {
                debug!("Reaped orphaned natives directory {:?}", dir);
                reaped += 1;
            }
            Err(e) => warn!("Cannot reap natives directory {:?}: {}", dir, e),
        }
    }

    if reaped > 0 {
        info!("Reaped {} orphaned natives directories", reaped);
    }
    Ok(reaped)
}
