//! Per-run audit log.
//!
//! `RunLog` is owned by the orchestrator for the lifetime of one run. It
//! truncates the log file when opened, appends one line per entry in the form
//! `<rfc3339 timestamp> <LEVEL> <source> <message>`, mirrors every entry into
//! `tracing`, and is closed exactly once during finalization.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, SecondsFormat, Utc};
use tracing::Level;

use crate::domain::Result;

/// One line of the run log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: Level,
    pub source: String,
    pub message: String,
}

impl LogEntry {
    /// Render as a single log line. Embedded newlines are indented so each
    /// entry still starts with a timestamp.
    pub fn to_line(&self) -> String {
        format!(
            "{} {} {} {}",
            self.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
            self.level,
            self.source,
            self.message.trim_end().replace('\n', "\n    ")
        )
    }
}

/// Append-only log file for a single experiment run.
#[derive(Debug)]
pub struct RunLog {
    path: PathBuf,
    source: String,
    writer: Option<BufWriter<File>>,
}

impl RunLog {
    /// Create (or truncate) the log at `path`; entries are attributed to `source`.
    pub fn create(path: &Path, source: &str) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let file = File::create(path)?;
        Ok(RunLog {
            path: path.to_path_buf(),
            source: source.to_string(),
            writer: Some(BufWriter::new(file)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_closed(&self) -> bool {
        self.writer.is_none()
    }

    pub fn info(&mut self, message: &str) {
        self.record(Level::INFO, message);
    }

    pub fn warn(&mut self, message: &str) {
        self.record(Level::WARN, message);
    }

    pub fn error(&mut self, message: &str) {
        self.record(Level::ERROR, message);
    }

    /// Append an entry. Entries recorded after `close()` only reach tracing.
    pub fn record(&mut self, level: Level, message: &str) {
        match level {
            Level::ERROR => tracing::error!(source = %self.source, "{message}"),
            Level::WARN => tracing::warn!(source = %self.source, "{message}"),
            Level::INFO => tracing::info!(source = %self.source, "{message}"),
            Level::DEBUG => tracing::debug!(source = %self.source, "{message}"),
            Level::TRACE => tracing::trace!(source = %self.source, "{message}"),
        }

        let Some(writer) = self.writer.as_mut() else {
            return;
        };
        let entry = LogEntry {
            timestamp: Utc::now(),
            level,
            source: self.source.clone(),
            message: message.to_string(),
        };
        if let Err(e) = writeln!(writer, "{}", entry.to_line()) {
            tracing::warn!(path = %self.path.display(), error = %e, "Failed to write run log");
        }
    }

    /// Flush and fsync the log and release the file handle.
    ///
    /// Only the first call does anything.
    pub fn close(&mut self) -> Result<()> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush()?;
            writer.get_ref().sync_all()?;
        }
        Ok(())
    }
}

impl Drop for RunLog {
    fn drop(&mut self) {
        if let Some(writer) = self.writer.as_mut() {
            let _ = writer.flush();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::tempdir;

    #[test]
    fn test_entry_line_format() {
        let entry = LogEntry {
            timestamp: Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap(),
            level: Level::INFO,
            source: "envexp".to_string(),
            message: "Imports passed successfully!".to_string(),
        };
        assert_eq!(
            entry.to_line(),
            "2024-03-01T12:30:00.000Z INFO envexp Imports passed successfully!"
        );
    }

    #[test]
    fn test_multiline_message_stays_attributed() {
        let entry = LogEntry {
            timestamp: Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap(),
            level: Level::ERROR,
            source: "envexp".to_string(),
            message: "Imports failed!\nTraceback\n".to_string(),
        };
        assert!(entry.to_line().ends_with("Imports failed!\n    Traceback"));
    }

    #[test]
    fn test_create_truncates_previous_run() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.log");
        std::fs::write(&path, "old run\n").unwrap();

        let mut log = RunLog::create(&path, "envexp").unwrap();
        log.info("fresh");
        log.close().unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(!content.contains("old run"));
        assert!(content.trim_end().ends_with("INFO envexp fresh"));
    }

    #[test]
    fn test_close_is_idempotent_and_final() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("logs").join("test.log");

        let mut log = RunLog::create(&path, "envexp").unwrap();
        log.warn("before close");
        log.close().unwrap();
        assert!(log.is_closed());

        log.error("after close");
        log.close().unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 1);
        assert!(content.contains("WARN envexp before close"));
    }
}
