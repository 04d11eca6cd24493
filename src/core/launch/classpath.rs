// ─── Classpath Builder ───
// Joins the collected runtime libraries into the JVM classpath, primary game
// jar last.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use tracing::debug;

use super::collector::CollectedLibrary;
use crate::core::error::{LauncherError, LauncherResult};

/// Platform-specific Java classpath separator.
pub fn classpath_separator() -> &'static str {
    if cfg!(target_os = "windows") {
        ";"
    } else {
        ":"
    }
}

/// `<versions_dir>/<jar>/<jar>.jar`
pub fn game_jar_path(versions_dir: &Path, jar_name: &str) -> PathBuf {
    versions_dir
        .join(jar_name)
        .join(format!("{}.jar", jar_name))
}

/// Ordered classpath entries. Natives are skipped, identical paths are kept
/// once (first occurrence wins) and the game jar is always the final entry.
pub fn build_classpath(
    libraries: &[CollectedLibrary],
    libraries_dir: &Path,
    game_jar: &Path,
) -> LauncherResult<Vec<PathBuf>> {
    let game_jar_key = path_key(game_jar);
    let mut seen = HashSet::new();
    let mut entries = Vec::with_capacity(libraries.len() + 1);

    for library in libraries.iter().filter(|l| !l.is_native()) {
        if library.path.as_os_str().is_empty() {
            continue;
        }
        let path = libraries_dir.join(&library.path);
        let key = path_key(&path);
        if key == game_jar_key || !seen.insert(key) {
            debug!("Dropping repeated classpath entry {:?}", path);
            continue;
        }
        entries.push(path);
    }

    if game_jar.as_os_str().is_empty() {
        return Err(LauncherError::Preparation(
            "no primary game jar for classpath".into(),
        ));
    }
    entries.push(game_jar.to_path_buf());

    Ok(entries)
}

pub fn join_classpath(entries: &[PathBuf]) -> String {
    entries
        .iter()
        .map(|p| safe_path_str(p))
        .collect::<Vec<_>>()
        .join(classpath_separator())
}

fn path_key(path: &Path) -> String {
    let text = path.to_string_lossy().to_string();
    if cfg!(target_os = "windows") {
        text.to_lowercase()
    } else {
        text
    }
}

/// Path as a launch-argument string. Canonicalises when the path exists.
pub fn safe_path_str(path: &Path) -> String {
    let resolved = std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
    let text = resolved.to_string_lossy().to_string();

    #[cfg(target_os = "windows")]
    {
        // Java's classpath handling chokes on `\\?\` extended-length paths.
        if let Some(stripped) = text.strip_prefix(r"\\?\") {
            return stripped.to_string();
        }
    }

    text
}
