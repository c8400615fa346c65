//! Per-request scratch directories.
//!
//! Every request that needs files on disk (extractor metadata, thumbnails,
//! the metadata blob handed back for the download step) gets its own
//! directory. The directory is removed when the [`ScratchDir`] is closed or
//! dropped, so every exit path releases it.

use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::{debug, warn};

use crate::Result;

/// Thumbnail extensions picked up after metadata extraction.
pub const THUMBNAIL_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "webp"];

/// Metadata files written by the extractor end in `.json`.
const METADATA_EXTENSION: &str = "json";

/// A uniquely named temporary directory owned by one request.
#[derive(Debug)]
pub struct ScratchDir {
    dir: TempDir,
}

impl ScratchDir {
    /// Create a new directory under the system temp dir.
    pub fn new(prefix: &str) -> Result<Self> {
        let dir = tempfile::Builder::new().prefix(prefix).tempdir()?;
        debug!(path = %dir.path().display(), "Created scratch directory");
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Write `contents` to `name` inside the directory and return the full path.
    pub async fn write_file(&self, name: &str, contents: &[u8]) -> Result<PathBuf> {
        let path = self.dir.path().join(name);
        tokio::fs::write(&path, contents).await?;
        Ok(path)
    }

    /// Regular files whose extension is one of `extensions`, sorted by name.
    pub async fn files_with_extension(&self, extensions: &[&str]) -> Result<Vec<PathBuf>> {
        let mut entries = tokio::fs::read_dir(self.dir.path()).await?;
        let mut files = Vec::new();

        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            let path = entry.path();
            let matches = path
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| extensions.iter().any(|e| e.eq_ignore_ascii_case(ext)));
            if matches {
                files.push(path);
            }
        }

        files.sort();
        Ok(files)
    }

    /// Metadata files left by the extractor, sorted by name.
    pub async fn metadata_files(&self) -> Result<Vec<PathBuf>> {
        self.files_with_extension(&[METADATA_EXTENSION]).await
    }

    /// The first thumbnail image with an allowed extension, if any.
    pub async fn thumbnail(&self) -> Result<Option<PathBuf>> {
        Ok(self
            .files_with_extension(THUMBNAIL_EXTENSIONS)
            .await?
            .into_iter()
            .next())
    }

    /// Remove the directory now, logging instead of failing.
    pub fn close(self) {
        let path = self.dir.path().to_path_buf();
        match self.dir.close() {
            Ok(()) => debug!(path = %path.display(), "Removed scratch directory"),
            Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove scratch directory"),
        }
    }
}
