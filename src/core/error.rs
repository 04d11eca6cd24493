use std::path::PathBuf;
use thiserror::Error;

use crate::core::launch::Phase;

/// Central error type for the launch core.
/// Every module returns `Result<T, LauncherError>`.
#[derive(Debug, Error)]
pub enum LauncherError {
    // ── Configuration ───────────────────────────────────
    #[error("Circular inheritance while resolving version {0}")]
    CircularReference(String),

    #[error("Version not found: {0}")]
    MissingVersion(String),

    #[error("No main class declared anywhere in the chain of {0}")]
    MissingMainClass(String),

    #[error("Invalid version descriptor {id}: {reason}")]
    InvalidDescriptor { id: String, reason: String },

    // ── IO ──────────────────────────────────────────────
    #[error("IO error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    // ── Network ─────────────────────────────────────────
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Download failed for {url}: HTTP {status}")]
    DownloadFailed { url: String, status: u16 },

    #[error("SHA-1 mismatch for {path:?}: expected {expected}, got {actual}")]
    Sha1Mismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    // ── Maven ───────────────────────────────────────────
    #[error("Invalid Maven coordinate: {0}")]
    InvalidMavenCoordinate(String),

    // ── JSON ────────────────────────────────────────────
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // ── Archive ─────────────────────────────────────────
    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    // ── Preparation ─────────────────────────────────────
    #[error("Launch preparation failed: {0}")]
    Preparation(String),

    #[error("Launch cancelled")]
    Cancelled,

    // ── Process ─────────────────────────────────────────
    #[error("Illegal launch state: cannot {action} while {phase:?}")]
    IllegalState { action: &'static str, phase: Phase },

    #[error("Failed to spawn game process: {0}")]
    Spawn(String),

    #[error("Game process failure: {0}")]
    Runtime(String),

    // ── Instance ────────────────────────────────────────
    #[error("Instance not found: {0}")]
    InstanceNotFound(String),

    // ── Snapshot ────────────────────────────────────────
    #[error("Snapshot of {path:?} could not be taken: {reason}")]
    Snapshot { path: PathBuf, reason: String },

    #[error(
        "Rollback failed ({reason}). The snapshot archive was kept at {archive:?}; restore {target:?} from it manually"
    )]
    SnapshotIntegrity {
        target: PathBuf,
        archive: PathBuf,
        reason: String,
    },
}

/// Coarse classification used by callers that only care about how to react.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Chain resolution problems. Fatal, never retried.
    Configuration,
    /// Asset, library or native failures before any process exists.
    Preparation,
    /// The OS refused to create the process.
    Spawn,
    /// Unexpected failure after spawn.
    Runtime,
    Cancellation,
    /// Supervisor API misuse.
    IllegalState,
    /// A snapshot could not be taken; the action never ran.
    Snapshot,
    /// Rollback failed and the archive was preserved.
    SnapshotIntegrity,
}

impl LauncherError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            LauncherError::CircularReference(_)
            | LauncherError::MissingVersion(_)
            | LauncherError::MissingMainClass(_)
            | LauncherError::InvalidDescriptor { .. } => ErrorCategory::Configuration,
            LauncherError::Io { .. }
            | LauncherError::Http(_)
            | LauncherError::DownloadFailed { .. }
            | LauncherError::Sha1Mismatch { .. }
            | LauncherError::InvalidMavenCoordinate(_)
            | LauncherError::Json(_)
            | LauncherError::Zip(_)
            | LauncherError::Preparation(_)
            | LauncherError::InstanceNotFound(_) => ErrorCategory::Preparation,
            LauncherError::Cancelled => ErrorCategory::Cancellation,
            LauncherError::IllegalState { .. } => ErrorCategory::IllegalState,
            LauncherError::Spawn(_) => ErrorCategory::Spawn,
            LauncherError::Runtime(_) => ErrorCategory::Runtime,
            LauncherError::Snapshot { .. } => ErrorCategory::Snapshot,
            LauncherError::SnapshotIntegrity { .. } => ErrorCategory::SnapshotIntegrity,
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        LauncherError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Convenience alias used throughout the crate.
pub type LauncherResult<T> = Result<T, LauncherError>;

impl From<std::io::Error> for LauncherError {
    fn from(source: std::io::Error) -> Self {
        LauncherError::Io {
            path: PathBuf::new(),
            source,
        }
    }
}

// ── Serialization for IPC ───────────────────────────────
// Front-ends receive the error as its display string.
impl serde::Serialize for LauncherError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}
