//! Git integration for recording run outcomes.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use conda_env_manager::{CommandRunner, CommandSpec};
use tracing::info;

use crate::domain::{ExperimentError, Result};

/// Stages the working tree and commits it.
pub struct CommitRecorder {
    runner: Arc<dyn CommandRunner>,
    repo_dir: PathBuf,
}

impl CommitRecorder {
    pub fn new(runner: Arc<dyn CommandRunner>, repo_dir: &Path) -> Self {
        CommitRecorder {
            runner,
            repo_dir: repo_dir.to_path_buf(),
        }
    }

    async fn git(&self, args: &[&str]) -> Result<String> {
        let spec = CommandSpec::new("git")
            .args(args.iter().copied())
            .cwd(&self.repo_dir);
        let output = self
            .runner
            .run(&spec)
            .await
            .map_err(|e| ExperimentError::Git(format!("failed to run git: {e}")))?;

        if !output.success() {
            let reason = if output.stderr.trim().is_empty() {
                output.stdout.trim().to_string()
            } else {
                output.stderr.trim().to_string()
            };
            return Err(ExperimentError::Git(format!(
                "git {} failed: {reason}",
                args.first().copied().unwrap_or_default()
            )));
        }

        Ok(output.stdout)
    }

    /// `git add .` then `git commit -m <message>`.
    pub async fn commit_all(&self, message: &str) -> Result<()> {
        self.git(&["add", "."]).await?;
        self.git(&["commit", "-m", message]).await?;
        info!(repo = %self.repo_dir.display(), "Committed run outcome");
        Ok(())
    }

    /// Capture the HEAD commit SHA.
    pub async fn head_sha(&self) -> Result<String> {
        let sha = self.git(&["rev-parse", "HEAD"]).await?.trim().to_string();
        if sha.is_empty() {
            return Err(ExperimentError::Git(
                "git rev-parse HEAD returned empty output".to_string(),
            ));
        }
        Ok(sha)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conda_env_manager::fakes::ScriptedRunner;
    use conda_env_manager::ProcessRunner;
    use std::process::Command as StdCommand;

    fn run_git(repo_dir: &Path, args: &[&str]) -> String {
        let output = StdCommand::new("git")
            .args(args)
            .current_dir(repo_dir)
            .output()
            .unwrap();
        assert!(
            output.status.success(),
            "git {:?} failed: {}",
            args,
            String::from_utf8_lossy(&output.stderr)
        );
        String::from_utf8_lossy(&output.stdout).to_string()
    }

    fn make_git_repo() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        run_git(dir.path(), &["init"]);
        run_git(dir.path(), &["config", "user.name", "test-user"]);
        run_git(dir.path(), &["config", "user.email", "test@example.com"]);
        run_git(dir.path(), &["commit", "--allow-empty", "-m", "initial"]);
        dir
    }

    #[tokio::test]
    async fn commit_all_records_untracked_files() {
        let repo = make_git_repo();
        std::fs::write(repo.path().join("pip_freeze.txt"), "QtPy==2.4.1\n").unwrap();

        let recorder = CommitRecorder::new(Arc::new(ProcessRunner), repo.path());
        recorder.commit_all("P: bump qtpy").await.unwrap();

        let subject = run_git(repo.path(), &["log", "-1", "--format=%s"]);
        assert_eq!(subject.trim(), "P: bump qtpy");
        let files = run_git(repo.path(), &["show", "--name-only", "--format="]);
        assert!(files.contains("pip_freeze.txt"));

        let sha = recorder.head_sha().await.unwrap();
        assert_eq!(sha.len(), 40, "SHA should be 40 hex chars, got: {sha}");
    }

    #[tokio::test]
    async fn commit_all_fails_outside_repo() {
        let dir = tempfile::tempdir().unwrap();
        let recorder = CommitRecorder::new(Arc::new(ProcessRunner), dir.path());
        let err = recorder.commit_all("F: nothing").await.unwrap_err();
        assert!(matches!(err, ExperimentError::Git(_)));
    }

    #[tokio::test]
    async fn commit_failure_reports_stdout_when_stderr_empty() {
        let fake = Arc::new(ScriptedRunner::new().on(
            "git commit",
            1,
            "nothing to commit, working tree clean\n",
            "",
        ));
        let recorder = CommitRecorder::new(fake.clone(), Path::new("/repo"));
        let err = recorder.commit_all("P: x").await.unwrap_err();
        assert!(err.to_string().contains("nothing to commit"));
        assert_eq!(fake.calls(), vec!["git add .", "git commit -m P: x"]);
    }
}
