//! In-environment checks.
//!
//! Two checks run inside the experiment environment, import check first:
//! importing the extracted package, then the user's smoke test. Each passes
//! iff its command exits 0.

use std::path::{Path, PathBuf};

use conda_env_manager::{CommandOutput, EnvironmentManager};

use crate::domain::{CheckKind, ExperimentError, Result};
use crate::run_log::RunLog;

/// Result of a passing check.
#[derive(Debug, Clone)]
pub struct TestResult {
    pub check: CheckKind,
    pub output: CommandOutput,
}

impl CheckKind {
    fn pass_message(self) -> &'static str {
        match self {
            CheckKind::Imports => "Imports passed successfully!",
            CheckKind::UserTest => "Tests passed successfully!",
        }
    }

    fn fail_message(self) -> &'static str {
        match self {
            CheckKind::Imports => "Imports failed!",
            CheckKind::UserTest => "Tests failed!",
        }
    }
}

/// Runs checks in one environment.
pub struct TestRunner {
    manager: EnvironmentManager,
    env_name: String,
    work_dir: PathBuf,
}

impl TestRunner {
    pub fn new(manager: EnvironmentManager, env_name: &str, work_dir: &Path) -> Self {
        TestRunner {
            manager,
            env_name: env_name.to_string(),
            work_dir: work_dir.to_path_buf(),
        }
    }

    /// `python -c "import <package>"` from the directory containing the package.
    pub async fn run_import_check(
        &self,
        package_dir: &Path,
        package: &str,
        log: &mut RunLog,
    ) -> Result<TestResult> {
        let command = vec![
            "python".to_string(),
            "-c".to_string(),
            format!("import {package}"),
        ];
        let cwd = package_dir.parent().unwrap_or(&self.work_dir);
        self.check(CheckKind::Imports, &command, cwd, log).await
    }

    /// The user's smoke test, run from the working directory.
    pub async fn run_user_test(&self, command: &[String], log: &mut RunLog) -> Result<TestResult> {
        self.check(CheckKind::UserTest, command, &self.work_dir, log)
            .await
    }

    async fn check(
        &self,
        kind: CheckKind,
        command: &[String],
        cwd: &Path,
        log: &mut RunLog,
    ) -> Result<TestResult> {
        let output = match self.manager.run_in(&self.env_name, command, Some(cwd)).await {
            Ok(output) => output,
            Err(e) => {
                log.error(&format!("{}\n{e}", kind.fail_message()));
                return Err(e.into());
            }
        };

        if output.success() {
            log.info(kind.pass_message());
            return Ok(TestResult { check: kind, output });
        }

        let detail = failure_detail(&output);
        log.error(&format!("{}\n{detail}", kind.fail_message()));
        Err(ExperimentError::TestFailed {
            check: kind,
            detail,
        })
    }
}

/// stderr if there is any, otherwise stdout, otherwise the exit code.
fn failure_detail(output: &CommandOutput) -> String {
    let stderr = output.clean_stderr();
    if !stderr.is_empty() {
        return stderr;
    }
    let stdout = output.stdout.trim();
    if !stdout.is_empty() {
        return stdout.to_string();
    }
    format!("exited with code {}", output.exit_code)
}

#[cfg(test)]
mod tests {
    use super::*;
    use conda_env_manager::fakes::ScriptedRunner;
    use conda_env_manager::CondaTool;
    use std::sync::Arc;
    use tempfile::tempdir;

    fn runner_for(script: ScriptedRunner) -> (Arc<ScriptedRunner>, TestRunner) {
        let fake = Arc::new(script);
        let manager = EnvironmentManager::new(CondaTool::new("mamba", "1.5"), fake.clone());
        (fake, TestRunner::new(manager, "experiment", Path::new("/work")))
    }

    #[tokio::test]
    async fn test_import_check_runs_from_package_parent() {
        let dir = tempdir().unwrap();
        let mut log = RunLog::create(&dir.path().join("test.log"), "envexp").unwrap();
        let (fake, runner) = runner_for(ScriptedRunner::new());

        let result = runner
            .run_import_check(Path::new("/work/experiment"), "experiment", &mut log)
            .await
            .unwrap();
        assert_eq!(result.check, CheckKind::Imports);

        let spec = &fake.specs()[0];
        assert_eq!(
            spec.display(),
            "mamba run -n experiment python -c import experiment"
        );
        assert_eq!(spec.cwd.as_deref(), Some(Path::new("/work")));

        log.close().unwrap();
        let content = std::fs::read_to_string(dir.path().join("test.log")).unwrap();
        assert!(content.contains("Imports passed successfully!"));
    }

    #[tokio::test]
    async fn test_failed_user_test_captures_stderr() {
        let dir = tempdir().unwrap();
        let mut log = RunLog::create(&dir.path().join("test.log"), "envexp").unwrap();
        let (_, runner) = runner_for(ScriptedRunner::new().on(
            "mamba run -n experiment python smoke_test.py",
            1,
            "",
            "Traceback (most recent call last):\r\r\nRuntimeError: no display\r\r\n",
        ));

        let command = vec!["python".to_string(), "smoke_test.py".to_string()];
        let err = runner.run_user_test(&command, &mut log).await.unwrap_err();
        match err {
            ExperimentError::TestFailed { check, detail } => {
                assert_eq!(check, CheckKind::UserTest);
                assert_eq!(
                    detail,
                    "Traceback (most recent call last):\nRuntimeError: no display"
                );
            }
            other => panic!("unexpected error: {other}"),
        }

        log.close().unwrap();
        let content = std::fs::read_to_string(dir.path().join("test.log")).unwrap();
        assert!(content.contains("ERROR envexp Tests failed!"));
        assert!(content.contains("RuntimeError: no display"));
    }

    #[test]
    fn test_failure_detail_fallbacks() {
        let out = CommandOutput {
            exit_code: 2,
            stdout: "assertion failed\n".to_string(),
            ..Default::default()
        };
        assert_eq!(failure_detail(&out), "assertion failed");

        let out = CommandOutput {
            exit_code: 2,
            ..Default::default()
        };
        assert_eq!(failure_detail(&out), "exited with code 2");
    }
}
