//! # Directory Watcher
//!
//! Waits for an external producer, such as an image-synthesis backend, to
//! finish writing a new file into a directory.
//!
//! The producer offers no completion callback. The only observable signal is
//! the file itself: a file counts as finished once it is newer than the
//! baseline taken before the work was dispatched and its size is unchanged
//! across one settle delay.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    Completion Watcher                           │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  WatchTarget ──► snapshot() ──► Snapshot (baseline)             │
//! │       │                              │                          │
//! │       ▼                              ▼                          │
//! │  FileSystem ◄── wait(baseline) ──► StableFileResult             │
//! │  (list + stat)   poll / settle      Found(path) | TimedOut      │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use atelier_directory_watcher::{CompletionWatcher, WatchTarget, WatchTimings};
//!
//! let watcher = CompletionWatcher::new(
//!     WatchTarget::new("output").with_glob("generated_image_*.png"),
//!     WatchTimings::default(),
//! )?;
//!
//! let baseline = watcher.snapshot().await?;
//! dispatch_generation().await?;
//! match watcher.wait(&baseline).await? {
//!     StableFileResult::Found(path) => serve(path),
//!     StableFileResult::TimedOut => fail("generation did not complete in time"),
//! }
//! ```

pub mod config;
pub mod error;
pub mod fs;
pub mod snapshot;
pub mod watcher;

pub use config::{MatchRule, WatchTarget, WatchTimings};
pub use error::{Result, WatcherError};
pub use fs::{FileStat, FileSystem, TokioFileSystem};
pub use snapshot::Snapshot;
pub use watcher::{CompletionWatcher, StableFileResult};
