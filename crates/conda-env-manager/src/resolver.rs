//! Environment manager discovery
//!
//! Picks which conda-family binary to drive. Candidates are probed in a fixed
//! priority order (faster reimplementations first, plain `conda` last) and the
//! first one whose `--version` exits cleanly with an empty stderr wins.

use crate::error::CondaError;
use crate::runner::{CommandRunner, CommandSpec};
use crate::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

/// Default probe order.
pub const DEFAULT_CANDIDATES: [&str; 3] = ["mamba", "micromamba", "conda"];

/// A resolved environment manager binary.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CondaTool {
    /// Program name or path as it is invoked
    pub program: String,
    /// Output of the version probe
    pub version: String,
}

impl CondaTool {
    pub fn new(program: impl Into<String>, version: impl Into<String>) -> Self {
        CondaTool {
            program: program.into(),
            version: version.into(),
        }
    }

    /// micromamba prompts on `env remove`/`env create` unless given `-y`.
    pub fn needs_yes_flag(&self) -> bool {
        Path::new(&self.program)
            .file_stem()
            .map(|stem| stem == "micromamba")
            .unwrap_or(false)
    }
}

impl std::fmt::Display for CondaTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.program)
    }
}

/// Probes candidate binaries in priority order.
#[derive(Debug, Clone)]
pub struct ToolResolver {
    candidates: Vec<String>,
    probe_timeout_secs: u64,
}

impl Default for ToolResolver {
    fn default() -> Self {
        ToolResolver {
            candidates: DEFAULT_CANDIDATES.iter().map(|c| c.to_string()).collect(),
            probe_timeout_secs: 30,
        }
    }
}

impl ToolResolver {
    /// Resolver over a custom candidate list, highest priority first
    pub fn with_candidates<I, S>(candidates: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ToolResolver {
            candidates: candidates.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    pub fn probe_timeout_secs(mut self, secs: u64) -> Self {
        self.probe_timeout_secs = secs;
        self
    }

    pub fn candidates(&self) -> &[String] {
        &self.candidates
    }

    /// Return the first candidate whose version probe succeeds.
    ///
    /// # TDD: test_resolve_prefers_first_responding_candidate
    pub async fn resolve(&self, runner: &dyn CommandRunner) -> Result<CondaTool> {
        for candidate in &self.candidates {
            let probe = CommandSpec::new(candidate.as_str())
                .arg("--version")
                .timeout_secs(self.probe_timeout_secs);

            match runner.run(&probe).await {
                Ok(out) if out.success() && out.stderr.trim().is_empty() => {
                    let version = out.stdout.trim().to_string();
                    info!(tool = %candidate, version = %version, "Resolved environment manager");
                    return Ok(CondaTool::new(candidate.as_str(), version));
                }
                Ok(out) => {
                    debug!(
                        tool = %candidate,
                        exit_code = out.exit_code,
                        stderr = %out.stderr.trim(),
                        "Candidate rejected"
                    );
                }
                Err(e) => {
                    debug!(tool = %candidate, error = %e, "Candidate not available");
                }
            }
        }

        Err(CondaError::ToolNotFound {
            tried: self.candidates.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::ScriptedRunner;

    #[test]
    fn test_default_priority_order() {
        let resolver = ToolResolver::default();
        assert_eq!(resolver.candidates(), &["mamba", "micromamba", "conda"]);
    }

    #[test]
    fn test_yes_flag_only_for_micromamba() {
        assert!(CondaTool::new("micromamba", "").needs_yes_flag());
        assert!(CondaTool::new("/opt/bin/micromamba", "").needs_yes_flag());
        assert!(!CondaTool::new("mamba", "").needs_yes_flag());
        assert!(!CondaTool::new("conda", "").needs_yes_flag());
    }

    #[tokio::test]
    async fn test_resolve_prefers_first_responding_candidate() {
        let runner = ScriptedRunner::new()
            .missing("mamba")
            .on("micromamba --version", 0, "micromamba 1.5.8", "")
            .on("conda --version", 0, "conda 24.1.0", "");

        let tool = ToolResolver::default().resolve(&runner).await.unwrap();
        assert_eq!(tool.program, "micromamba");
        assert_eq!(tool.version, "micromamba 1.5.8");
    }

    #[tokio::test]
    async fn test_resolve_rejects_probe_with_stderr() {
        let runner = ScriptedRunner::new()
            .on("mamba --version", 0, "", "mamba: command not found")
            .missing("micromamba")
            .on("conda --version", 0, "conda 24.1.0", "");

        let tool = ToolResolver::default().resolve(&runner).await.unwrap();
        assert_eq!(tool.program, "conda");
    }

    #[tokio::test]
    async fn test_resolve_fails_when_nothing_responds() {
        let runner = ScriptedRunner::new()
            .missing("mamba")
            .on("micromamba --version", 127, "", "")
            .missing("conda");

        let err = ToolResolver::default().resolve(&runner).await.unwrap_err();
        assert!(matches!(err, CondaError::ToolNotFound { ref tried } if tried.len() == 3));

        // Only probes were issued
        assert!(runner.calls().iter().all(|c| c.ends_with("--version")));
    }
}
