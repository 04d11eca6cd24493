// ─── Snapshot Store ───
// Takes the archive before an action, and discards it or rolls back from it
// afterwards.

use std::future::Future;
use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::archive::{
    extract_archive, file_sha1, move_path, remove_path, remove_quietly, top_level_entries,
    write_archive, write_json,
};
use super::SnapshotRecord;
use crate::core::error::{LauncherError, LauncherResult};

/// Snapshot archives live under `<root>/<owner-id>/<uuid>.zip`.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    root: PathBuf,
}

impl SnapshotStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Run `action` against `target` with rollback on failure.
    ///
    /// On success the snapshot is deleted and the action's value returned.
    /// On failure `target` (or just the `allow_list` entries) is restored
    /// and the action's error returned. If the restore itself fails the
    /// archive is kept and `SnapshotIntegrity` is returned instead.
    pub async fn run<F, Fut, T>(
        &self,
        owner_id: &str,
        target: &Path,
        allow_list: &[String],
        action: F,
    ) -> LauncherResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = LauncherResult<T>>,
    {
        let record = self.begin(owner_id, target, allow_list).await?;

        match action().await {
            Ok(value) => {
                discard(&record);
                Ok(value)
            }
            Err(action_error) => {
                warn!(
                    "Action on {:?} failed ({}), rolling back from {:?}",
                    target, action_error, record.archive
                );
                let restored = {
                    let record = record.clone();
                    tokio::task::spawn_blocking(move || rollback(&record))
                        .await
                        .map_err(|e| LauncherError::Runtime(e.to_string()))
                        .and_then(|r| r)
                };

                match restored {
                    Ok(()) => {
                        info!("Rolled back {:?}", target);
                        discard(&record);
                        Err(action_error)
                    }
                    Err(rollback_error) => {
                        error!(
                            "Rollback of {:?} failed: {}. Snapshot kept at {:?}",
                            target, rollback_error, record.archive
                        );
                        Err(LauncherError::SnapshotIntegrity {
                            target: record.target.clone(),
                            archive: record.archive.clone(),
                            reason: format!(
                                "{} (original failure: {})",
                                rollback_error, action_error
                            ),
                        })
                    }
                }
            }
        }
    }

    /// Records left behind by failed rollbacks for `owner_id`.
    pub fn preserved(&self, owner_id: &str) -> LauncherResult<Vec<SnapshotRecord>> {
        let dir = self.root.join(owner_id);
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut records = Vec::new();
        for path in top_level_entries(&dir)? {
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let raw = std::fs::read_to_string(&path).map_err(|e| LauncherError::io(&path, e))?;
            match serde_json::from_str::<SnapshotRecord>(&raw) {
                Ok(record) => records.push(record),
                Err(e) => warn!("Unreadable snapshot record {:?}: {}", path, e),
            }
        }
        Ok(records)
    }

    async fn begin(
        &self,
        owner_id: &str,
        target: &Path,
        allow_list: &[String],
    ) -> LauncherResult<SnapshotRecord> {
        let id = Uuid::new_v4().to_string();
        let dir = self.root.join(owner_id);
        let archive = dir.join(format!("{}.zip", id));
        let record_path = dir.join(format!("{}.json", id));

        let job = {
            let target = target.to_path_buf();
            let allow_list = allow_list.to_vec();
            let archive = archive.clone();
            move || -> LauncherResult<String> {
                write_archive(&target, &allow_list, &archive)?;
                file_sha1(&archive)
            }
        };
        let sha1 = tokio::task::spawn_blocking(job)
            .await
            .map_err(|e| LauncherError::Runtime(e.to_string()))
            .and_then(|r| r);

        let sha1 = match sha1 {
            Ok(sha1) => sha1,
            Err(e) => {
                remove_quietly(&archive);
                return Err(snapshot_error(target, e));
            }
        };

        let record = SnapshotRecord {
            id,
            created_at: Utc::now(),
            target: target.to_path_buf(),
            archive: archive.clone(),
            allow_list: allow_list.to_vec(),
            sha1,
        };
        if let Err(e) = write_json(&record_path, &record) {
            remove_quietly(&archive);
            remove_quietly(&record_path);
            return Err(snapshot_error(target, e));
        }

        info!("Snapshot {} of {:?} taken", record.id, target);
        Ok(record)
    }
}

fn snapshot_error(target: &Path, cause: LauncherError) -> LauncherError {
    match cause {
        LauncherError::Snapshot { .. } => cause,
        other => LauncherError::Snapshot {
            path: target.to_path_buf(),
            reason: other.to_string(),
        },
    }
}

fn record_path(record: &SnapshotRecord) -> PathBuf {
    record.archive.with_extension("json")
}

fn discard(record: &SnapshotRecord) {
    remove_quietly(&record.archive);
    remove_quietly(&record_path(record));
}

/// Restore `record.target` from the archive via a staging directory beside it.
fn rollback(record: &SnapshotRecord) -> LauncherResult<()> {
    let actual = file_sha1(&record.archive)?;
    if actual != record.sha1 {
        return Err(LauncherError::Sha1Mismatch {
            path: record.archive.clone(),
            expected: record.sha1.clone(),
            actual,
        });
    }

    let target = &record.target;
    let name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "target".into());
    let staging = target
        .parent()
        .unwrap_or(target)
        .join(format!(".{}.rollback-{}", name, record.id));

    let result = restore_from(record, &staging);
    remove_quietly(&staging);
    result
}

fn restore_from(record: &SnapshotRecord, staging: &Path) -> LauncherResult<()> {
    let target = &record.target;
    extract_archive(&record.archive, staging)?;
    std::fs::create_dir_all(target).map_err(|e| LauncherError::io(target, e))?;

    if record.allow_list.is_empty() {
        for entry in top_level_entries(target)? {
            remove_path(&entry)?;
        }
        for entry in top_level_entries(staging)? {
            if let Some(name) = entry.file_name() {
                move_path(&entry, &target.join(name))?;
            }
        }
    } else {
        for rel in &record.allow_list {
            let live = target.join(rel);
            remove_path(&live)?;
            let saved = staging.join(rel);
            if std::fs::symlink_metadata(&saved).is_ok() {
                move_path(&saved, &live)?;
            }
        }
    }
    Ok(())
}
