//! Filesystem access used by the watcher.
//!
//! The watcher only ever lists one directory and stats files in it. Keeping
//! those two reads behind [`FileSystem`] lets tests script exact size
//! sequences without racing a real writer.

use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use async_trait::async_trait;
use tokio::fs;
use tracing::debug;

use crate::error::{Result, WatcherError};

/// A regular file observed during a directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileStat {
    /// Full path to the file.
    pub path: PathBuf,

    /// Last modification time.
    pub modified: SystemTime,

    /// Size in bytes at listing time.
    pub len: u64,
}

/// Read-only view of the filesystem.
#[async_trait]
pub trait FileSystem: Send + Sync {
    /// List the regular files directly inside `dir`.
    ///
    /// Entries that disappear while the listing is in progress are skipped.
    /// Failing to read the directory itself is an error.
    async fn list_files(&self, dir: &Path) -> Result<Vec<FileStat>>;

    /// Current size of `path`, or `None` if it no longer exists.
    async fn file_size(&self, path: &Path) -> Result<Option<u64>>;
}

/// [`FileSystem`] backed by `tokio::fs`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioFileSystem;

#[async_trait]
impl FileSystem for TokioFileSystem {
    async fn list_files(&self, dir: &Path) -> Result<Vec<FileStat>> {
        let mut entries = fs::read_dir(dir)
            .await
            .map_err(|e| WatcherError::from_io(dir, e))?;

        let mut files = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| WatcherError::from_io(dir, e))?
        {
            let path = entry.path();

            // Follows symlinks, so a link to a finished image counts.
            let metadata = match fs::metadata(&path).await {
                Ok(metadata) => metadata,
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    debug!("Entry vanished during listing: {}", path.display());
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            if !metadata.is_file() {
                continue;
            }

            files.push(FileStat {
                modified: metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH),
                len: metadata.len(),
                path,
            });
        }

        Ok(files)
    }

    async fn file_size(&self, path: &Path) -> Result<Option<u64>> {
        match fs::metadata(path).await {
            Ok(metadata) => Ok(Some(metadata.len())),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
