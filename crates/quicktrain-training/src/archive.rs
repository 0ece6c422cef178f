//! Archive resolution: fetch a named object and unpack it into a directory.

use crate::error::ResolutionError;
use quicktrain_abstraction::{key_basename, ObjectStore};
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

const ZIP_MAGIC: &[u8] = b"PK\x03\x04";
const GZIP_MAGIC: &[u8] = &[0x1f, 0x8b];

/// How a downloaded object is turned into files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    Zip,
    Tar,
    TarGz,
    /// Anything else: copied as one file under its base name.
    Single,
}

impl ArchiveFormat {
    /// Picks a format from the key's extension, falling back to magic bytes.
    #[must_use]
    pub fn detect(key: &str, bytes: &[u8]) -> Self {
        let lower = key.to_lowercase();
        if lower.ends_with(".zip") {
            Self::Zip
        } else if lower.ends_with(".tar.gz") || lower.ends_with(".tgz") {
            Self::TarGz
        } else if lower.ends_with(".tar") {
            Self::Tar
        } else if bytes.starts_with(ZIP_MAGIC) {
            Self::Zip
        } else if bytes.starts_with(GZIP_MAGIC) && !lower.ends_with(".gz") {
            // A bare `.gz` is a single compressed file, not a tarball.
            Self::TarGz
        } else {
            Self::Single
        }
    }
}

/// Result of a successful resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedPath {
    pub path: PathBuf,
    pub format: ArchiveFormat,
    /// Regular files written.
    pub files: usize,
}

/// Fetches remote objects and extracts them into working directories.
#[derive(Clone)]
pub struct ArchiveResolver {
    store: Arc<dyn ObjectStore>,
}

impl std::fmt::Debug for ArchiveResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArchiveResolver").field("store", &self.store.name()).finish()
    }
}

impl ArchiveResolver {
    #[must_use]
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    #[must_use]
    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    /// Downloads `key` and unpacks it into `destination` (created if missing).
    pub async fn resolve(&self, key: &str, destination: &Path) -> Result<ExtractedPath, ResolutionError> {
        let bytes = self
            .store
            .download(key)
            .await
            .map_err(|source| ResolutionError::Download { key: key.to_string(), source })?;

        let format = ArchiveFormat::detect(key, &bytes);
        debug!(key = %key, format = ?format, size = bytes.len(), "Extracting object");

        let owned_key = key.to_string();
        let dest = destination.to_path_buf();
        let files = tokio::task::spawn_blocking(move || extract(&owned_key, format, &bytes, &dest))
            .await
            .map_err(|e| ResolutionError::Io {
                key: key.to_string(),
                source: std::io::Error::other(e),
            })??;

        Ok(ExtractedPath { path: destination.to_path_buf(), format, files })
    }

    /// Like [`resolve`](Self::resolve) for references the job can live without.
    ///
    /// Failures are logged and swallowed.
    pub async fn resolve_optional(&self, key: &str, destination: &Path) -> Option<ExtractedPath> {
        match self.resolve(key, destination).await {
            Ok(extracted) => Some(extracted),
            Err(e) => {
                warn!(key = %key, error = %e, "Optional reference could not be resolved, continuing without it");
                None
            }
        }
    }
}

fn extract(key: &str, format: ArchiveFormat, bytes: &[u8], dest: &Path) -> Result<usize, ResolutionError> {
    let io_err = |source: std::io::Error| ResolutionError::Io { key: key.to_string(), source };
    std::fs::create_dir_all(dest).map_err(io_err)?;

    match format {
        ArchiveFormat::Zip => extract_zip(key, bytes, dest),
        ArchiveFormat::Tar => extract_tar(key, Cursor::new(bytes), dest),
        ArchiveFormat::TarGz => extract_tar(key, flate2::read::GzDecoder::new(Cursor::new(bytes)), dest),
        ArchiveFormat::Single => {
            std::fs::write(dest.join(key_basename(key)), bytes).map_err(io_err)?;
            Ok(1)
        }
    }
}

fn extract_zip(key: &str, bytes: &[u8], dest: &Path) -> Result<usize, ResolutionError> {
    let corrupt = |reason: String| ResolutionError::Corrupt { key: key.to_string(), reason };
    let io_err = |source: std::io::Error| ResolutionError::Io { key: key.to_string(), source };

    let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).map_err(|e| corrupt(e.to_string()))?;
    let mut files = 0;

    for index in 0..archive.len() {
        let mut entry = archive.by_index(index).map_err(|e| corrupt(e.to_string()))?;
        let Some(relative) = entry.enclosed_name() else {
            warn!(key = %key, entry = %entry.name(), "Skipping zip entry outside the destination");
            continue;
        };
        let out = dest.join(relative);

        if entry.is_dir() {
            std::fs::create_dir_all(&out).map_err(io_err)?;
            continue;
        }
        if let Some(parent) = out.parent() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        let mut file = std::fs::File::create(&out).map_err(io_err)?;
        std::io::copy(&mut entry, &mut file).map_err(|e| corrupt(e.to_string()))?;
        files += 1;
    }

    Ok(files)
}

fn extract_tar<R: Read>(key: &str, reader: R, dest: &Path) -> Result<usize, ResolutionError> {
    let corrupt = |e: std::io::Error| ResolutionError::Corrupt { key: key.to_string(), reason: e.to_string() };

    let mut archive = tar::Archive::new(reader);
    let mut files = 0;
    for entry in archive.entries().map_err(corrupt)? {
        let mut entry = entry.map_err(corrupt)?;
        let is_file = entry.header().entry_type().is_file();
        // `unpack_in` refuses paths that would land outside `dest`.
        if entry.unpack_in(dest).map_err(corrupt)? && is_file {
            files += 1;
        }
    }
    Ok(files)
}
