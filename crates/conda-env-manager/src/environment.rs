//! Environment lifecycle through the resolved tool
//!
//! Wraps the four CLI operations the experiment workflow needs:
//! `env remove`, `env create`, `run -n` and `list`.

use crate::error::CondaError;
use crate::resolver::CondaTool;
use crate::runner::{CommandOutput, CommandRunner, CommandSpec};
use crate::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// The experiment environment: a fixed name plus the manifest it is built from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentDescriptor {
    pub name: String,
    pub manifest_path: PathBuf,
}

impl EnvironmentDescriptor {
    pub fn new(name: impl Into<String>, manifest_path: impl Into<PathBuf>) -> Self {
        EnvironmentDescriptor {
            name: name.into(),
            manifest_path: manifest_path.into(),
        }
    }
}

/// Drives one resolved environment manager.
#[derive(Clone)]
pub struct EnvironmentManager {
    tool: CondaTool,
    runner: Arc<dyn CommandRunner>,
    timeout_secs: u64,
}

impl EnvironmentManager {
    pub fn new(tool: CondaTool, runner: Arc<dyn CommandRunner>) -> Self {
        EnvironmentManager {
            tool,
            runner,
            timeout_secs: 0,
        }
    }

    /// Timeout applied to every invocation; zero waits forever.
    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    pub fn tool(&self) -> &CondaTool {
        &self.tool
    }

    fn command(&self) -> CommandSpec {
        CommandSpec::new(self.tool.program.as_str()).timeout_secs(self.timeout_secs)
    }

    fn with_yes(&self, spec: CommandSpec) -> CommandSpec {
        if self.tool.needs_yes_flag() {
            spec.arg("-y")
        } else {
            spec
        }
    }

    /// Remove the environment if it exists.
    ///
    /// Never fails: removing an environment that is not there is the normal
    /// case on a first run. Returns whether the tool reported success.
    pub async fn remove(&self, name: &str) -> bool {
        let spec = self.with_yes(self.command().args(["env", "remove", "-n", name]));
        match self.runner.run(&spec).await {
            Ok(out) if out.success() => {
                info!(env = %name, "Removed environment");
                true
            }
            Ok(out) => {
                debug!(env = %name, exit_code = out.exit_code, "Environment not removed");
                false
            }
            Err(e) => {
                warn!(env = %name, error = %e, "Environment removal could not run");
                false
            }
        }
    }

    /// Create the environment from its manifest.
    ///
    /// # TDD: test_create_failure_carries_stderr
    pub async fn create(&self, env: &EnvironmentDescriptor) -> Result<CommandOutput> {
        let manifest = env.manifest_path.to_string_lossy();
        let spec = self.with_yes(self.command().args([
            "env",
            "create",
            "-n",
            env.name.as_str(),
            "-f",
            manifest.as_ref(),
        ]));

        let out = self.runner.run(&spec).await?;
        if !out.success() {
            return Err(CondaError::EnvironmentCreate {
                name: env.name.clone(),
                stderr: out.clean_stderr(),
            });
        }

        info!(env = %env.name, duration_ms = out.duration_ms, "Created environment");
        Ok(out)
    }

    /// Run `command` inside the environment.
    ///
    /// A non-zero exit is returned as data for the caller to classify.
    pub async fn run_in(
        &self,
        name: &str,
        command: &[String],
        cwd: Option<&Path>,
    ) -> Result<CommandOutput> {
        if command.is_empty() {
            return Err(CondaError::EmptyCommand);
        }

        let mut spec = self
            .command()
            .args(["run", "-n", name])
            .args(command.iter().cloned());
        if let Some(dir) = cwd {
            spec = spec.cwd(dir);
        }

        self.runner.run(&spec).await
    }

    /// Lines of `<tool> list` run inside the environment, exactly as printed.
    pub async fn list_packages(&self, name: &str) -> Result<Vec<String>> {
        let command = vec![self.tool.program.clone(), "list".to_string()];
        let out = self.run_in(name, &command, None).await?;
        if !out.success() {
            warn!(env = %name, exit_code = out.exit_code, "Package listing exited non-zero");
        }
        Ok(out.stdout.lines().map(str::to_string).collect())
    }
}
