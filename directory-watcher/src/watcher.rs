//! Completion watcher implementation.

use std::path::{Path, PathBuf};

use tokio::time::{Instant, sleep, sleep_until};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{WatchTarget, WatchTimings};
use crate::error::{Result, WatcherError};
use crate::fs::{FileSystem, TokioFileSystem};
use crate::snapshot::{Snapshot, latest_matching};

/// Outcome of one watch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StableFileResult {
    /// A new file whose size held steady across one settle delay.
    Found(PathBuf),

    /// Nothing new stabilized before the deadline.
    TimedOut,
}

impl StableFileResult {
    /// The found file, if any.
    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::Found(path) => Some(path),
            Self::TimedOut => None,
        }
    }

    pub fn is_timed_out(&self) -> bool {
        matches!(self, Self::TimedOut)
    }
}

/// Result of sampling a candidate's size twice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stability {
    Stable(u64),
    Changed { before: u64, after: u64 },
    Vanished,
}

/// Waits for an external producer to finish writing a new file.
///
/// The producer gives no completion signal, so a file counts as finished once
/// it is newer than the baseline and its size is the same on two samples taken
/// one settle delay apart.
pub struct CompletionWatcher<F = TokioFileSystem> {
    target: WatchTarget,
    timings: WatchTimings,
    fs: F,
}

impl CompletionWatcher<TokioFileSystem> {
    /// Create a watcher over the real filesystem.
    pub fn new(target: WatchTarget, timings: WatchTimings) -> Result<Self> {
        Self::with_file_system(target, timings, TokioFileSystem)
    }
}

impl<F: FileSystem> CompletionWatcher<F> {
    /// Create a watcher over a custom [`FileSystem`].
    ///
    /// The target directory is made absolute so every reported path is too.
    pub fn with_file_system(mut target: WatchTarget, timings: WatchTimings, fs: F) -> Result<Self> {
        timings.validate()?;
        target.rule.validate()?;
        target.directory = std::path::absolute(&target.directory)?;

        Ok(Self {
            target,
            timings,
            fs,
        })
    }

    pub fn target(&self) -> &WatchTarget {
        &self.target
    }

    pub fn timings(&self) -> &WatchTimings {
        &self.timings
    }

    pub fn file_system(&self) -> &F {
        &self.fs
    }

    /// Record the matching files present now. Take this before dispatching work.
    pub async fn snapshot(&self) -> Result<Snapshot> {
        let files = self.fs.list_files(&self.target.directory).await?;
        let snapshot = Snapshot::capture(files, &self.target.rule);
        debug!(
            "Snapshot of {}: {} files, newest {:?}",
            self.target.directory.display(),
            snapshot.len(),
            snapshot.path()
        );
        Ok(snapshot)
    }

    /// Block until a file absent from `baseline` appears and stops growing,
    /// or until the timeout elapses.
    ///
    /// `baseline` should come from [`Self::snapshot`] on this watcher so that
    /// paths compare equal. A file recorded in the baseline is never reported,
    /// even if it was touched or rewritten in place.
    pub async fn wait(&self, baseline: &Snapshot) -> Result<StableFileResult> {
        let started = Instant::now();
        let deadline = started.checked_add(self.timings.timeout).ok_or_else(|| {
            WatcherError::Config(format!(
                "timeout {:?} overflows the clock",
                self.timings.timeout
            ))
        })?;
        let mut checks = 0u32;

        while Instant::now() < deadline {
            match self.newest_since(baseline).await? {
                Some(candidate) => {
                    checks += 1;
                    match self.check_stability(&candidate).await? {
                        Stability::Stable(len) => {
                            info!(
                                "Output {} is stable at {len} bytes after {:?} ({checks} checks)",
                                candidate.display(),
                                started.elapsed()
                            );
                            return Ok(StableFileResult::Found(candidate));
                        }
                        Stability::Changed { before, after } => {
                            debug!(
                                "Output {} still being written ({before} -> {after} bytes)",
                                candidate.display()
                            );
                            // The settle delay already spaced the samples.
                            continue;
                        }
                        Stability::Vanished => {
                            debug!("Candidate {} vanished during check", candidate.display());
                        }
                    }
                }
                None => debug!(
                    "No new matching file in {}; files present at the baseline are not reported",
                    self.target.directory.display()
                ),
            }

            let wake = Instant::now()
                .checked_add(self.timings.poll_interval)
                .map_or(deadline, |next| next.min(deadline));
            sleep_until(wake).await;
        }

        warn!(
            "No stable output in {} after {:?}",
            self.target.directory.display(),
            self.timings.timeout
        );
        Ok(StableFileResult::TimedOut)
    }

    /// Like [`Self::wait`], but returns `None` as soon as `cancel` fires.
    pub async fn wait_with_cancellation(
        &self,
        baseline: &Snapshot,
        cancel: &CancellationToken,
    ) -> Result<Option<StableFileResult>> {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("Watch on {} cancelled", self.target.directory.display());
                Ok(None)
            }
            result = self.wait(baseline) => result.map(Some),
        }
    }

    /// Newest matching file that was not present at `baseline`.
    async fn newest_since(&self, baseline: &Snapshot) -> Result<Option<PathBuf>> {
        let mut files = self.fs.list_files(&self.target.directory).await?;
        files.retain(|file| !baseline.contains(&file.path));
        Ok(latest_matching(files, &self.target.rule).map(|file| file.path))
    }

    async fn check_stability(&self, path: &Path) -> Result<Stability> {
        let Some(before) = self.fs.file_size(path).await? else {
            return Ok(Stability::Vanished);
        };

        sleep(self.timings.settle_delay).await;

        let Some(after) = self.fs.file_size(path).await? else {
            return Ok(Stability::Vanished);
        };

        Ok(if before == after {
            Stability::Stable(after)
        } else {
            Stability::Changed { before, after }
        })
    }
}
