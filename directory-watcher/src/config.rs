//! Configuration types for completion watching.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, WatcherError};

/// Default pause between directory listings.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Default pause between the two size samples of a stability check.
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_secs(1);

/// Default overall deadline for one watch.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

/// Upper bound accepted for any single watch duration.
pub const MAX_WATCH_DURATION: Duration = Duration::from_secs(24 * 60 * 60);

/// The directory to watch and which files in it count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchTarget {
    /// Directory the producer writes into. Not searched recursively.
    pub directory: PathBuf,

    /// Which file names are eligible.
    pub rule: MatchRule,
}

impl WatchTarget {
    /// Watch every regular file in `directory`.
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            rule: MatchRule::Any,
        }
    }

    /// Set the matching rule.
    pub fn with_rule(mut self, rule: MatchRule) -> Self {
        self.rule = rule;
        self
    }

    /// Only accept files with the given extension.
    pub fn with_extension(self, extension: impl Into<String>) -> Self {
        self.with_rule(MatchRule::Extension(extension.into()))
    }

    /// Only accept file names matching a glob such as `generated_*.png`.
    pub fn with_glob(self, pattern: impl Into<String>) -> Self {
        self.with_rule(MatchRule::Glob(pattern.into()))
    }

    /// Check whether `path` is eligible under the matching rule.
    pub fn matches(&self, path: &Path) -> bool {
        self.rule.matches(path)
    }
}

/// Rule deciding which file names a watch considers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum MatchRule {
    /// Any regular file.
    #[default]
    Any,

    /// Files whose extension equals this one, case-insensitively. A leading
    /// dot is ignored.
    Extension(String),

    /// Files whose name (not full path) matches this glob.
    Glob(String),
}

impl MatchRule {
    /// Reject glob patterns that do not compile.
    pub fn validate(&self) -> Result<()> {
        if let Self::Glob(pattern) = self {
            glob::Pattern::new(pattern).map_err(|e| WatcherError::InvalidPattern {
                pattern: pattern.clone(),
                reason: e.msg.to_string(),
            })?;
        }
        Ok(())
    }

    /// Check whether the file name of `path` satisfies the rule.
    pub fn matches(&self, path: &Path) -> bool {
        match self {
            Self::Any => true,
            Self::Extension(wanted) => {
                let wanted = wanted.trim_start_matches('.');
                path.extension()
                    .and_then(|e| e.to_str())
                    .is_some_and(|e| e.eq_ignore_ascii_case(wanted))
            }
            Self::Glob(pattern) => {
                let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                    return false;
                };
                glob::Pattern::new(pattern).is_ok_and(|glob| glob.matches(name))
            }
        }
    }
}

/// Timing knobs for one watch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchTimings {
    /// Pause between listings when there is no new candidate.
    pub poll_interval: Duration,

    /// Pause between the two size samples of a stability check.
    pub settle_delay: Duration,

    /// Overall deadline, measured from the start of the watch.
    pub timeout: Duration,
}

impl WatchTimings {
    /// Create timings from explicit durations.
    pub fn new(poll_interval: Duration, settle_delay: Duration, timeout: Duration) -> Self {
        Self {
            poll_interval,
            settle_delay,
            timeout,
        }
    }

    /// Set the poll interval.
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Set the settle delay.
    pub fn with_settle_delay(mut self, settle_delay: Duration) -> Self {
        self.settle_delay = settle_delay;
        self
    }

    /// Set the overall timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// All three durations must be positive and at most [`MAX_WATCH_DURATION`].
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("poll_interval", self.poll_interval),
            ("settle_delay", self.settle_delay),
            ("timeout", self.timeout),
        ] {
            if value.is_zero() {
                return Err(WatcherError::Config(format!("{name} must be positive")));
            }
            if value > MAX_WATCH_DURATION {
                return Err(WatcherError::Config(format!(
                    "{name} must not exceed {}s",
                    MAX_WATCH_DURATION.as_secs()
                )));
            }
        }
        Ok(())
    }
}

impl Default for WatchTimings {
    fn default() -> Self {
        Self::new(DEFAULT_POLL_INTERVAL, DEFAULT_SETTLE_DELAY, DEFAULT_TIMEOUT)
    }
}
