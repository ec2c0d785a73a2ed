//! Bounded wait for the run log to land on disk.
//!
//! After the run log is closed the orchestrator polls the file's modification
//! time until it moves past the value observed before finalization began, or
//! the timeout elapses. A timeout is not an error; the commit goes ahead.

use std::path::Path;
use std::time::{Duration, SystemTime};

use tokio::time::Instant;
use tracing::debug;

/// Poll interval and timeout for [`LogSync::wait_for_update`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogSync {
    pub interval: Duration,
    pub timeout: Duration,
}

impl Default for LogSync {
    fn default() -> Self {
        LogSync {
            interval: Duration::from_millis(500),
            timeout: Duration::from_secs(10),
        }
    }
}

/// Last-modified time of `path`, if it exists.
pub fn modified_time(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}

impl LogSync {
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        LogSync { interval, timeout }
    }

    /// Wait until `path`'s mtime differs from `baseline`.
    ///
    /// Returns `true` once a change is seen, `false` on timeout.
    pub async fn wait_for_update(&self, path: &Path, baseline: Option<SystemTime>) -> bool {
        let deadline = Instant::now() + self.timeout;
        loop {
            if modified_time(path) != baseline {
                debug!(path = %path.display(), "Log file update observed");
                return true;
            }

            let now = Instant::now();
            if now >= deadline {
                debug!(path = %path.display(), timeout_ms = self.timeout.as_millis() as u64, "Log sync timed out");
                return false;
            }
            tokio::time::sleep(self.interval.min(deadline - now)).await;
        }
    }
}
