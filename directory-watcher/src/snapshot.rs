//! Point-in-time view of the matching files in a directory.

use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use crate::config::MatchRule;
use crate::fs::FileStat;

/// The matching files present at some instant, and the newest of them.
///
/// Taken once before a generation is dispatched. A watch started from this
/// baseline never reports any of the recorded files, even if one is touched
/// or rewritten afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    latest: Option<PathBuf>,
    present: BTreeSet<PathBuf>,
}

impl Snapshot {
    /// A snapshot of a directory with no matching file.
    pub fn empty() -> Self {
        Self::default()
    }

    /// A snapshot in which `path` is the only matching file.
    pub fn of(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self {
            present: BTreeSet::from([path.clone()]),
            latest: Some(path),
        }
    }

    /// Record the files in a listing accepted by `rule`.
    pub fn capture(files: Vec<FileStat>, rule: &MatchRule) -> Self {
        let matching: Vec<FileStat> = files
            .into_iter()
            .filter(|file| rule.matches(&file.path))
            .collect();
        let latest = matching
            .iter()
            .max_by(|a, b| newest_then_greatest_path(a, b))
            .map(|file| file.path.clone());

        Self {
            latest,
            present: matching.into_iter().map(|file| file.path).collect(),
        }
    }

    /// The newest matching file, if there was one.
    pub fn path(&self) -> Option<&Path> {
        self.latest.as_deref()
    }

    pub fn is_empty(&self) -> bool {
        self.present.is_empty()
    }

    /// Number of matching files recorded.
    pub fn len(&self) -> usize {
        self.present.len()
    }

    /// Whether `path` was present when the snapshot was taken.
    pub fn contains(&self, path: &Path) -> bool {
        self.present.contains(path)
    }

    pub fn into_path(self) -> Option<PathBuf> {
        self.latest
    }
}

/// Pick the newest file accepted by `rule`.
///
/// Equal modification times are broken by the greater path so that repeated
/// listings of an unchanged directory always agree, whatever order the OS
/// returns entries in.
pub fn latest_matching(files: Vec<FileStat>, rule: &MatchRule) -> Option<FileStat> {
    files
        .into_iter()
        .filter(|file| rule.matches(&file.path))
        .max_by(newest_then_greatest_path)
}

fn newest_then_greatest_path(a: &FileStat, b: &FileStat) -> Ordering {
    a.modified
        .cmp(&b.modified)
        .then_with(|| a.path.cmp(&b.path))
}
