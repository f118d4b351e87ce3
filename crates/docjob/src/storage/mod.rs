//! Artifact reclamation.
//!
//! The engine never reads or writes artifacts; it only forwards result
//! URLs. When a record is purged, or a freshly produced artifact turns out
//! to duplicate an earlier one, the URL is handed to an [`ArtifactStore`].

use std::path::{Component, Path, PathBuf};

use crate::error::StorageError;
use crate::sanitize::redact_url;

pub trait ArtifactStore: Send + Sync {
    /// Releases the artifact at `result_url`. Returns `true` if something
    /// was removed; an artifact that is already gone is not an error.
    fn reclaim(&self, result_url: &str) -> Result<bool, StorageError>;
}

/// Artifact store that keeps everything.
pub struct NoopArtifactStore;

impl ArtifactStore for NoopArtifactStore {
    fn reclaim(&self, _result_url: &str) -> Result<bool, StorageError> {
        Ok(false)
    }
}

/// Removes artifacts stored as files under a root directory.
///
/// Accepts `file://` URLs and bare relative paths. URLs with any other
/// scheme belong to a different store and are left alone.
pub struct FilesystemArtifactStore {
    root: PathBuf,
}

impl FilesystemArtifactStore {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Maps a result URL to a path under the root, or `None` for foreign schemes.
    fn resolve(&self, result_url: &str) -> Result<Option<PathBuf>, StorageError> {
        let raw = match result_url.strip_prefix("file://") {
            Some(path) => path,
            None if result_url.contains("://") => return Ok(None),
            None => result_url,
        };

        let path = Path::new(raw);
        if path
            .components()
            .any(|c| matches!(c, Component::ParentDir))
        {
            return Err(StorageError::OutsideRoot(path.to_path_buf()));
        }

        let full = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        };
        if !full.starts_with(&self.root) {
            return Err(StorageError::OutsideRoot(full));
        }
        Ok(Some(full))
    }
}

impl ArtifactStore for FilesystemArtifactStore {
    fn reclaim(&self, result_url: &str) -> Result<bool, StorageError> {
        let path = match self.resolve(result_url)? {
            Some(path) => path,
            None => {
                log::debug!(
                    "Not reclaiming {}: not a filesystem artifact",
                    redact_url(result_url)
                );
                return Ok(false);
            }
        };

        match std::fs::remove_file(&path) {
            Ok(()) => {
                log::debug!("Reclaimed artifact {}", path.display());
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StorageError::RemoveFile { path, source: e }),
        }
    }
}
