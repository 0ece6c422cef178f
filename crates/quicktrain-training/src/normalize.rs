//! Directory Normalizer: flattens an extracted class directory in place.

use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

/// What one normalization pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NormalizeReport {
    /// Files moved up to the top level.
    pub relocated: usize,
    /// Metadata files and leftovers removed.
    pub removed_files: usize,
    pub removed_dirs: usize,
}

impl NormalizeReport {
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.relocated == 0 && self.removed_files == 0 && self.removed_dirs == 0
    }
}

/// Platform metadata such as `.DS_Store` or `__MACOSX`.
#[must_use]
pub fn is_metadata_name(name: &str) -> bool {
    name.starts_with('.') || name.starts_with("__")
}

/// Flattens `dir` so that every eligible file sits directly beneath it.
///
/// Nested files are moved to the top level under their own name (a later file
/// with the same name replaces an earlier one). Files with metadata names are not
/// relocated. Afterwards every subdirectory is removed, deepest first, together
/// with anything left inside, and top-level files starting with `.` are deleted.
/// Running it on an already-flat directory changes nothing.
pub fn normalize_class_dir(dir: &Path) -> std::io::Result<NormalizeReport> {
    let mut report = NormalizeReport::default();

    let nested: Vec<PathBuf> = WalkDir::new(dir)
        .min_depth(2)
        .sort_by_file_name()
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .map(walkdir::DirEntry::into_path)
        .collect();

    // Files whose name is taken by a subdirectory wait until the subdirectories are gone.
    let mut pending: Vec<(PathBuf, PathBuf)> = Vec::new();
    for path in nested {
        let Some(name) = path.file_name() else { continue };
        if is_metadata_name(&name.to_string_lossy()) {
            continue;
        }
        let target = dir.join(name);
        if target.is_dir() {
            let staged = dir.join(format!("__pending_{}", pending.len()));
            debug!(file = %path.display(), "Name taken by a directory, staging");
            std::fs::rename(&path, &staged)?;
            pending.push((staged, target));
        } else {
            std::fs::rename(&path, &target)?;
        }
        report.relocated += 1;
    }

    let leftovers: Vec<(PathBuf, bool)> = WalkDir::new(dir)
        .min_depth(1)
        .contents_first(true)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.depth() > 1 || entry.file_type().is_dir())
        .map(|entry| {
            let is_dir = entry.file_type().is_dir();
            (entry.into_path(), is_dir)
        })
        .collect();

    for (path, is_dir) in leftovers {
        if is_dir {
            std::fs::remove_dir(&path)?;
            report.removed_dirs += 1;
        } else {
            std::fs::remove_file(&path)?;
            report.removed_files += 1;
        }
    }

    for (staged, target) in pending {
        std::fs::rename(&staged, &target)?;
    }

    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_file() && entry.file_name().to_string_lossy().starts_with('.') {
            std::fs::remove_file(entry.path())?;
            report.removed_files += 1;
        }
    }

    debug!(
        dir = %dir.display(),
        relocated = report.relocated,
        removed_files = report.removed_files,
        removed_dirs = report.removed_dirs,
        "Normalized class directory"
    );
    Ok(report)
}

/// Async wrapper running [`normalize_class_dir`] on the blocking pool.
pub async fn normalize(dir: &Path) -> std::io::Result<NormalizeReport> {
    let dir = dir.to_path_buf();
    tokio::task::spawn_blocking(move || normalize_class_dir(&dir))
        .await
        .map_err(std::io::Error::other)?
}
