//! Error types for the completion watcher.

use std::io;
use std::path::Path;

use thiserror::Error;

/// Result type alias for watcher operations.
pub type Result<T> = std::result::Result<T, WatcherError>;

/// Errors that can occur while watching for a completed file.
///
/// Timing out is not an error; see [`crate::StableFileResult::TimedOut`].
/// Every variant here means the watch cannot make progress and retrying
/// will not help.
#[derive(Error, Debug)]
pub enum WatcherError {
    /// Directory not found.
    #[error("directory not found: {0}")]
    DirectoryNotFound(String),

    /// Path exists but is not a directory.
    #[error("not a directory: {0}")]
    NotADirectory(String),

    /// Permission denied.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// Invalid file name pattern.
    #[error("invalid match pattern {pattern:?}: {reason}")]
    InvalidPattern { pattern: String, reason: String },

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

impl WatcherError {
    /// Classify an IO error raised while reading `path`.
    pub(crate) fn from_io(path: &Path, err: io::Error) -> Self {
        let shown = path.display().to_string();
        match err.kind() {
            io::ErrorKind::NotFound => Self::DirectoryNotFound(shown),
            io::ErrorKind::NotADirectory => Self::NotADirectory(shown),
            io::ErrorKind::PermissionDenied => Self::PermissionDenied(shown),
            _ => Self::Io(err),
        }
    }
}
