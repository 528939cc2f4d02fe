//! File availability polling.
//!
//! Backup tools, virus scanners and other editors routinely hold settings
//! files open for a moment. Before reading or re-arming the watcher the store
//! waits here until the file can be opened for shared read/write access.
//!
//! The wait is best effort: after `max_attempts` failed opens the poller gives
//! up and reports `false`, and callers carry on regardless.

use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;
use tracing::{debug, trace};

/// Attempt cap used when nothing else is configured.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 30_000;

/// Sleep unit between attempts.
pub const DEFAULT_UNIT: Duration = Duration::from_millis(1);

/// How a directory's idle state is derived from its files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DirIdlePolicy {
    /// Every regular file in the directory must become idle.
    #[default]
    AllFiles,

    /// Only the last file checked (in name order) decides.
    LastFile,
}

/// Result of a single poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdleOutcome {
    /// Whether the file could be opened
    pub idle: bool,

    /// Number of open attempts made
    pub attempts: u32,
}

type Opener = fn(&Path) -> io::Result<()>;

/// Polls files until they can be opened for shared read/write access.
///
/// ## Example
///
/// ```rust,ignore
/// use keel_core::IdlePoller;
///
/// let poller = IdlePoller::new().with_backoff_steps(1);
/// if !poller.await_idle("settings/app.json".as_ref()) {
///     // still locked, proceed anyway
/// }
/// ```
#[derive(Debug, Clone)]
pub struct IdlePoller {
    max_attempts: u32,
    backoff_steps: u32,
    unit: Duration,
    dir_policy: DirIdlePolicy,
    opener: Opener,
}

impl Default for IdlePoller {
    fn default() -> Self {
        Self::new()
    }
}

impl IdlePoller {
    /// Create a poller with the default cap, no backoff and a 1 ms unit.
    pub fn new() -> Self {
        IdlePoller {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff_steps: 0,
            unit: DEFAULT_UNIT,
            dir_policy: DirIdlePolicy::default(),
            opener: open_shared,
        }
    }

    /// Set the attempt cap (at least one attempt is always made).
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Set the linear backoff: each retry sleeps `100 * steps + 1` units.
    pub fn with_backoff_steps(mut self, steps: u32) -> Self {
        self.backoff_steps = steps;
        self
    }

    /// Set the sleep unit.
    pub fn with_unit(mut self, unit: Duration) -> Self {
        self.unit = unit;
        self
    }

    /// Set the directory policy used by [`IdlePoller::await_dir_idle`].
    pub fn with_dir_policy(mut self, policy: DirIdlePolicy) -> Self {
        self.dir_policy = policy;
        self
    }

    #[cfg(test)]
    pub(crate) fn with_opener(mut self, opener: Opener) -> Self {
        self.opener = opener;
        self
    }

    /// The configured attempt cap.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// The configured directory policy.
    pub fn dir_policy(&self) -> DirIdlePolicy {
        self.dir_policy
    }

    /// Delay between two attempts.
    pub fn retry_delay(&self) -> Duration {
        let units = self.backoff_steps.saturating_mul(100).saturating_add(1);
        self.unit.saturating_mul(units)
    }

    /// Poll `path` until it opens or the attempt cap is reached.
    pub fn poll(&self, path: &Path) -> IdleOutcome {
        let delay = self.retry_delay();
        let mut attempts = 0;

        while attempts < self.max_attempts {
            attempts += 1;
            match (self.opener)(path) {
                Ok(()) => return IdleOutcome { idle: true, attempts },
                Err(e) => {
                    trace!(path = %path.display(), attempt = attempts, error = %e, "File busy");
                    if attempts < self.max_attempts && !delay.is_zero() {
                        thread::sleep(delay);
                    }
                }
            }
        }

        debug!(path = %path.display(), attempts, "Gave up waiting for file");
        IdleOutcome {
            idle: false,
            attempts,
        }
    }

    /// Wait until `path` is idle. Returns false if the cap was hit.
    pub fn await_idle(&self, path: &Path) -> bool {
        self.poll(path).idle
    }

    /// Wait on every regular file directly inside `dir`.
    ///
    /// Files are checked in name order. Under [`DirIdlePolicy::AllFiles`] the
    /// first file that never becomes idle ends the walk with `false`; an
    /// empty directory counts as idle. Under [`DirIdlePolicy::LastFile`] every
    /// file is waited on and only the last result is reported, so an empty
    /// directory is not idle.
    pub fn await_dir_idle(&self, dir: &Path) -> bool {
        let files = match list_files(dir) {
            Ok(files) => files,
            Err(e) => {
                debug!(path = %dir.display(), error = %e, "Cannot list directory");
                return false;
            }
        };

        match self.dir_policy {
            DirIdlePolicy::AllFiles => files.iter().all(|file| self.await_idle(file)),
            DirIdlePolicy::LastFile => {
                let mut idle = false;
                for file in &files {
                    idle = self.await_idle(file);
                }
                idle
            }
        }
    }
}

/// Open an existing file for read+write without taking an exclusive lock.
fn open_shared(path: &Path) -> io::Result<()> {
    OpenOptions::new().read(true).write(true).open(path).map(drop)
}

fn list_files(dir: &Path) -> io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}
