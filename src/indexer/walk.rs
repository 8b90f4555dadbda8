//! Candidate discovery

use std::path::{Component, Path, PathBuf};

use walkdir::WalkDir;

use crate::config::LibraryConfig;
use crate::error::IndexError;

/// Supported audio files under `root`, sorted by path
///
/// Unreadable entries below the root are logged and skipped.
///
/// # Errors
///
/// Returns `IndexError::WalkDir` if the root itself cannot be read
pub fn discover_audio_files(root: &Path, config: &LibraryConfig) -> Result<Vec<PathBuf>, IndexError> {
    let mut files = Vec::new();
    for entry in WalkDir::new(root).follow_links(true).sort_by_file_name() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) if e.depth() == 0 => return Err(e.into()),
            Err(e) => {
                log::warn!("Skipping unreadable entry: {}", e);
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let supported = entry
            .path()
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| config.is_supported_extension(e));
        if supported {
            files.push(entry.into_path());
        }
    }
    log::debug!("Found {} audio files under {}", files.len(), root.display());
    Ok(files)
}

/// Absolute, lexically normalized form of `path`, used as the record id
///
/// `.` components are dropped and `..` pops the previous component. Symlinks
/// are not resolved.
pub fn normalize_path(path: &Path) -> String {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    };

    let mut normalized = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized.to_string_lossy().into_owned()
}
