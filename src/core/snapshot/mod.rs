// ─── Snapshot Transactions ───
// Wraps a directory-mutating action: the directory is archived first, the
// archive is dropped on success and restored on failure. A failed restore
// keeps the archive and its JSON record for manual recovery.

pub mod archive;
mod transaction;

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use transaction::SnapshotStore;

/// Sidecar written next to every snapshot archive as `<id>.json`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SnapshotRecord {
    pub id: String,
    pub created_at: DateTime<Utc>,
    /// Directory the snapshot was taken of.
    pub target: PathBuf,
    pub archive: PathBuf,
    /// Top-level relative paths covered. Empty means the whole directory.
    pub allow_list: Vec<String>,
    pub sha1: String,
}
