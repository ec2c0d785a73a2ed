//! Dependency snapshot reports
//!
//! Records what actually got installed into the experiment environment as two
//! flat text reports: the manager's package list and `pip freeze`. Both are
//! overwritten on every snapshot.

use crate::environment::EnvironmentManager;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

/// Default report file names.
pub const PACKAGE_LIST_FILE: &str = "mamba_list.txt";
pub const PIP_FREEZE_FILE: &str = "pip_freeze.txt";

/// Point-in-time record of an environment's installed packages
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencySnapshot {
    /// `<tool> list` lines
    pub packages: Vec<String>,
    /// `pip freeze` lines
    pub freeze: Vec<String>,
}

/// Writes dependency reports into a directory.
#[derive(Debug, Clone)]
pub struct SnapshotLogger {
    package_list_path: PathBuf,
    freeze_path: PathBuf,
}

impl SnapshotLogger {
    pub fn new(dir: &Path) -> Self {
        SnapshotLogger {
            package_list_path: dir.join(PACKAGE_LIST_FILE),
            freeze_path: dir.join(PIP_FREEZE_FILE),
        }
    }

    pub fn package_list_path(&self) -> &Path {
        &self.package_list_path
    }

    pub fn freeze_path(&self) -> &Path {
        &self.freeze_path
    }

    /// Capture both reports for environment `name`.
    pub async fn snapshot(&self, manager: &EnvironmentManager, name: &str) -> Result<DependencySnapshot> {
        // Truncate first so a failed capture never leaves last run's reports behind
        std::fs::write(&self.package_list_path, "")?;
        std::fs::write(&self.freeze_path, "")?;

        let listed = manager.list_packages(name).await?;
        std::fs::write(&self.package_list_path, raw_report(&listed))?;

        let freeze_cmd = vec!["pip".to_string(), "freeze".to_string()];
        let frozen = manager.run_in(name, &freeze_cmd, None).await?;
        std::fs::write(&self.freeze_path, &frozen.stdout)?;

        let snapshot = DependencySnapshot {
            packages: strip_blank_lines(&self.package_list_path)?,
            freeze: strip_blank_lines(&self.freeze_path)?,
        };

        info!(
            env = %name,
            packages = snapshot.packages.len(),
            frozen = snapshot.freeze.len(),
            "Captured dependency snapshot"
        );
        Ok(snapshot)
    }
}

fn non_blank_lines(text: &str) -> Vec<String> {
    text.lines()
        .filter(|line| !line.trim().is_empty())
        .map(str::to_string)
        .collect()
}

fn raw_report(lines: &[String]) -> String {
    let mut out = lines.join("\n");
    if !out.is_empty() {
        out.push('\n');
    }
    out
}

/// Rewrite `path` without its blank lines and return the kept lines.
fn strip_blank_lines(path: &Path) -> Result<Vec<String>> {
    let content = std::fs::read_to_string(path)?;
    let lines = non_blank_lines(&content);

    std::fs::write(path, raw_report(&lines))?;

    Ok(lines)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::ScriptedRunner;
    use crate::resolver::CondaTool;
    use std::sync::Arc;
    use tempfile::tempdir;

    #[test]
    fn test_strip_blank_lines_in_place() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("report.txt");
        std::fs::write(&path, "a\n\n  \nb\r\n\n").unwrap();

        let lines = strip_blank_lines(&path).unwrap();
        assert_eq!(lines, vec!["a", "b"]);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "a\nb\n");
    }

    #[tokio::test]
    async fn test_snapshot_overwrites_previous_reports() {
        let dir = tempdir().unwrap();
        let logger = SnapshotLogger::new(dir.path());
        std::fs::write(logger.package_list_path(), "stale\n").unwrap();

        let runner = Arc::new(
            ScriptedRunner::new()
                .on("mamba run -n experiment mamba list", 0, "qtpy 2.4.1\n\npyside6 6.6\n", "")
                .on("mamba run -n experiment pip freeze", 0, "QtPy==2.4.1\n\n", ""),
        );
        let manager = EnvironmentManager::new(CondaTool::new("mamba", "1.5"), runner);

        let snapshot = logger.snapshot(&manager, "experiment").await.unwrap();
        assert_eq!(snapshot.packages, vec!["qtpy 2.4.1", "pyside6 6.6"]);
        assert_eq!(snapshot.freeze, vec!["QtPy==2.4.1"]);

        let listed = std::fs::read_to_string(logger.package_list_path()).unwrap();
        assert_eq!(listed, "qtpy 2.4.1\npyside6 6.6\n");

        // Idempotent: a second run produces identical files
        logger.snapshot(&manager, "experiment").await.unwrap();
        let again = std::fs::read_to_string(logger.package_list_path()).unwrap();
        assert_eq!(listed, again);
    }

    #[tokio::test]
    async fn test_snapshot_lists_through_resolved_tool() {
        let dir = tempdir().unwrap();
        let logger = SnapshotLogger::new(dir.path());
        let runner = Arc::new(ScriptedRunner::new().on(
            "micromamba run -n experiment micromamba list",
            0,
            "# packages in environment\n\nqtpy 2.4.1\n",
            "",
        ));
        let manager = EnvironmentManager::new(CondaTool::new("micromamba", "1.5"), runner.clone());

        let snapshot = logger.snapshot(&manager, "experiment").await.unwrap();
        assert_eq!(snapshot.packages, vec!["# packages in environment", "qtpy 2.4.1"]);
        assert_eq!(logger.package_list_path(), dir.path().join("mamba_list.txt").as_path());
        assert_eq!(
            std::fs::read_to_string(logger.package_list_path()).unwrap(),
            "# packages in environment\nqtpy 2.4.1\n"
        );
        assert_eq!(
            runner.calls(),
            vec![
                "micromamba run -n experiment micromamba list",
                "micromamba run -n experiment pip freeze",
            ]
        );
    }

    #[tokio::test]
    async fn test_snapshot_of_missing_environment_is_empty() {
        let dir = tempdir().unwrap();
        let logger = SnapshotLogger::new(dir.path());
        let runner = Arc::new(ScriptedRunner::new().on("conda run", 1, "", "not found"));
        let manager = EnvironmentManager::new(CondaTool::new("conda", "24"), runner);

        let snapshot = logger.snapshot(&manager, "experiment").await.unwrap();
        assert_eq!(snapshot, DependencySnapshot::default());
        assert_eq!(std::fs::read_to_string(logger.freeze_path()).unwrap(), "");
    }
}
