// ─── Snapshot Archives ───
// Zip packing and unpacking of a directory tree, plus the file moves used
// when swapping a restored tree into place. Symbolic links are stored as
// links and never followed.

use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use sha1::{Digest, Sha1};
use tracing::{debug, warn};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::core::error::{LauncherError, LauncherResult};

const S_IFMT: u32 = 0o170000;
const S_IFLNK: u32 = 0o120000;

/// Zip `root` into `archive`. With an empty `allow_list` every top-level
/// entry is included; otherwise only the listed relative paths that exist.
/// Directories (including empty ones), symbolic links and unix permissions
/// are kept.
pub fn write_archive(root: &Path, allow_list: &[String], archive: &Path) -> LauncherResult<()> {
    if !root.is_dir() {
        return Err(LauncherError::Snapshot {
            path: root.to_path_buf(),
            reason: "not a directory".into(),
        });
    }
    if let Some(parent) = archive.parent() {
        std::fs::create_dir_all(parent).map_err(|e| LauncherError::io(parent, e))?;
    }

    let file = File::create(archive).map_err(|e| LauncherError::io(archive, e))?;
    let mut zip = ZipWriter::new(file);

    let roots: Vec<PathBuf> = if allow_list.is_empty() {
        top_level_entries(root)?
    } else {
        allow_list
            .iter()
            .map(|rel| root.join(rel))
            .filter(|path| std::fs::symlink_metadata(path).is_ok())
            .collect()
    };

    for path in roots {
        add_path(&mut zip, root, &path)?;
    }
    zip.finish()?;
    Ok(())
}

fn add_path(zip: &mut ZipWriter<File>, root: &Path, path: &Path) -> LauncherResult<()> {
    let meta = std::fs::symlink_metadata(path).map_err(|e| LauncherError::io(path, e))?;
    let name = entry_name(root, path);
    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .unix_permissions(permissions(&meta));

    if meta.file_type().is_symlink() {
        let target = std::fs::read_link(path).map_err(|e| LauncherError::io(path, e))?;
        zip.add_symlink(name, target.to_string_lossy().into_owned(), options)?;
    } else if meta.is_dir() {
        zip.add_directory(format!("{}/", name), options)?;
        let mut children: Vec<PathBuf> = std::fs::read_dir(path)
            .map_err(|e| LauncherError::io(path, e))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .collect();
        children.sort();
        for child in children {
            add_path(zip, root, &child)?;
        }
    } else {
        zip.start_file(name, options)?;
        let mut source = File::open(path).map_err(|e| LauncherError::io(path, e))?;
        std::io::copy(&mut source, zip).map_err(|e| LauncherError::io(path, e))?;
    }
    Ok(())
}

/// Forward-slash path of `path` relative to `root`.
fn entry_name(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(unix)]
fn permissions(meta: &std::fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    meta.permissions().mode() & 0o7777
}

#[cfg(not(unix))]
fn permissions(meta: &std::fs::Metadata) -> u32 {
    if meta.is_dir() {
        0o755
    } else if meta.permissions().readonly() {
        0o444
    } else {
        0o644
    }
}

pub fn top_level_entries(dir: &Path) -> LauncherResult<Vec<PathBuf>> {
    let mut entries: Vec<PathBuf> = std::fs::read_dir(dir)
        .map_err(|e| LauncherError::io(dir, e))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .collect();
    entries.sort();
    Ok(entries)
}

/// Hex SHA-1 of a file, streamed.
pub fn file_sha1(path: &Path) -> LauncherResult<String> {
    let mut file = File::open(path).map_err(|e| LauncherError::io(path, e))?;
    let mut hasher = Sha1::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf).map_err(|e| LauncherError::io(path, e))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Unpack `archive` into `dest`, recreating symbolic links and restoring
/// permissions where the platform supports them.
pub fn extract_archive(archive: &Path, dest: &Path) -> LauncherResult<()> {
    let file = File::open(archive).map_err(|e| LauncherError::io(archive, e))?;
    let mut zip = ZipArchive::new(file)?;
    std::fs::create_dir_all(dest).map_err(|e| LauncherError::io(dest, e))?;

    let mut dir_modes = Vec::new();
    for index in 0..zip.len() {
        let mut entry = zip.by_index(index)?;
        let Some(relative) = entry.enclosed_name() else {
            return Err(LauncherError::Snapshot {
                path: archive.to_path_buf(),
                reason: format!("unsafe entry {:?}", entry.name()),
            });
        };
        let out_path = dest.join(relative);
        let mode = entry.unix_mode();

        if entry.is_dir() {
            std::fs::create_dir_all(&out_path).map_err(|e| LauncherError::io(&out_path, e))?;
            if let Some(mode) = mode {
                dir_modes.push((out_path, mode));
            }
            continue;
        }

        if let Some(parent) = out_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| LauncherError::io(parent, e))?;
        }

        if mode.is_some_and(|m| m & S_IFMT == S_IFLNK) {
            let mut target = String::new();
            entry
                .read_to_string(&mut target)
                .map_err(|e| LauncherError::io(&out_path, e))?;
            create_symlink(Path::new(&target), &out_path)?;
            continue;
        }

        let mut out = File::create(&out_path).map_err(|e| LauncherError::io(&out_path, e))?;
        std::io::copy(&mut entry, &mut out).map_err(|e| LauncherError::io(&out_path, e))?;
        drop(out);
        if let Some(mode) = mode {
            set_mode(&out_path, mode)?;
        }
    }

    // Deepest first, so read-only directories are still writable while filled.
    for (dir, mode) in dir_modes.into_iter().rev() {
        set_mode(&dir, mode)?;
    }
    Ok(())
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> LauncherResult<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode & 0o7777))
        .map_err(|e| LauncherError::io(path, e))
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) -> LauncherResult<()> {
    Ok(())
}

#[cfg(unix)]
fn create_symlink(target: &Path, link: &Path) -> LauncherResult<()> {
    std::os::unix::fs::symlink(target, link).map_err(|e| LauncherError::io(link, e))
}

#[cfg(not(unix))]
fn create_symlink(_target: &Path, link: &Path) -> LauncherResult<()> {
    Err(LauncherError::Snapshot {
        path: link.to_path_buf(),
        reason: "symbolic links cannot be restored on this platform".into(),
    })
}

/// Move `from` to `to`, copying across filesystems when a rename is refused.
pub fn move_path(from: &Path, to: &Path) -> LauncherResult<()> {
    if let Some(parent) = to.parent() {
        std::fs::create_dir_all(parent).map_err(|e| LauncherError::io(parent, e))?;
    }
    match std::fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(e) => {
            debug!("rename {:?} -> {:?} failed ({}), copying instead", from, to, e);
            copy_recursive(from, to)?;
            remove_path(from)
        }
    }
}

fn copy_recursive(from: &Path, to: &Path) -> LauncherResult<()> {
    let meta = std::fs::symlink_metadata(from).map_err(|e| LauncherError::io(from, e))?;
    if meta.file_type().is_symlink() {
        let target = std::fs::read_link(from).map_err(|e| LauncherError::io(from, e))?;
        create_symlink(&target, to)?;
    } else if meta.is_dir() {
        std::fs::create_dir_all(to).map_err(|e| LauncherError::io(to, e))?;
        for entry in std::fs::read_dir(from).map_err(|e| LauncherError::io(from, e))? {
            let entry = entry.map_err(|e| LauncherError::io(from, e))?;
            copy_recursive(&entry.path(), &to.join(entry.file_name()))?;
        }
        std::fs::set_permissions(to, meta.permissions()).map_err(|e| LauncherError::io(to, e))?;
    } else {
        std::fs::copy(from, to).map_err(|e| LauncherError::io(from, e))?;
    }
    Ok(())
}

/// Remove a file or directory tree. Missing paths are fine.
pub fn remove_path(path: &Path) -> LauncherResult<()> {
    let meta = match std::fs::symlink_metadata(path) {
        Ok(meta) => meta,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(LauncherError::io(path, e)),
    };
    let result = if meta.is_dir() {
        std::fs::remove_dir_all(path)
    } else {
        std::fs::remove_file(path)
    };
    result.map_err(|e| LauncherError::io(path, e))
}

/// Best-effort removal used on paths whose failure must not mask another
/// error.
pub fn remove_quietly(path: &Path) {
    if let Err(e) = remove_path(path) {
        warn!("Cannot remove {:?}: {}", path, e);
    }
}

pub(crate) fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> LauncherResult<()> {
    let json = serde_json::to_vec_pretty(value)?;
    let mut file = File::create(path).map_err(|e| LauncherError::io(path, e))?;
    file.write_all(&json).map_err(|e| LauncherError::io(path, e))?;
    Ok(())
}
