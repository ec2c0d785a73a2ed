//! Experiment lifecycle.
//!
//! One run walks `START -> TOOL_RESOLVED -> ENV_REMOVED -> ENV_CREATED ->
//! [IMPORTS_SCANNED -> IMPORTS_TESTED ->] USER_TESTED -> FINALIZED`. The first
//! failing stage short-circuits to finalization. Finalization itself always
//! runs exactly once: close the run log, wait for it to reach disk, then
//! commit the working tree with a `P: `/`F: ` tagged message.

use std::path::Path;
use std::sync::Arc;

use conda_env_manager::{
    CommandOutput, CommandRunner, DependencySnapshot, EnvironmentDescriptor, EnvironmentManager, SnapshotLogger,
    ToolResolver,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info, Instrument};
use uuid::Uuid;

use crate::config::ExperimentConfig;
use crate::domain::{ExperimentError, Result, RunOutcome, RunState};
use crate::git::CommitRecorder;
use crate::log_sync::modified_time;
use crate::run_log::RunLog;
use crate::scan::{ExtractedModuleSet, ImportScanner};
use crate::telemetry::run_span;
use crate::test_runner::TestRunner;

/// Source name stamped on run log entries.
const LOG_SOURCE: &str = "envexp";

/// Counts from the import scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanSummary {
    pub files_scanned: usize,
    pub modules: usize,
    pub imports: usize,
    pub unterminated: usize,
}

impl From<&ExtractedModuleSet> for ScanSummary {
    fn from(set: &ExtractedModuleSet) -> Self {
        ScanSummary {
            files_scanned: set.files_scanned,
            modules: set.records.len(),
            imports: set.total_imports(),
            unterminated: set.unterminated.len(),
        }
    }
}

/// Everything observable about a finished run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: String,
    /// States entered, in order, ending with `Finalized`
    pub states: Vec<RunState>,
    pub outcome: RunOutcome,
    pub tool: Option<String>,
    pub scan: Option<ScanSummary>,
    pub snapshot: Option<DependencySnapshot>,
    pub commit_message: String,
    /// Whether the log-sync wait saw the log file change before timing out
    pub log_synced: bool,
    pub commit_sha: Option<String>,
    pub commit_error: Option<String>,
}

impl RunReport {
    pub fn passed(&self) -> bool {
        self.outcome.passed()
    }

    pub fn committed(&self) -> bool {
        self.commit_error.is_none()
    }

    pub fn final_state_before_finalize(&self) -> Option<RunState> {
        self.states
            .iter()
            .rev()
            .find(|s| **s != RunState::Finalized)
            .copied()
    }
}

/// Mutable state threaded through the stages of one run.
#[derive(Debug)]
struct Progress {
    states: Vec<RunState>,
    outcome: RunOutcome,
    tool: Option<String>,
    scan: Option<ScanSummary>,
    snapshot: Option<DependencySnapshot>,
}

impl Progress {
    fn new() -> Self {
        Progress {
            states: vec![RunState::Start],
            outcome: RunOutcome::default(),
            tool: None,
            scan: None,
            snapshot: None,
        }
    }

    fn current(&self) -> RunState {
        self.states.last().copied().unwrap_or(RunState::Start)
    }

    fn advance(&mut self, next: RunState) {
        debug_assert!(
            self.current().can_transition_to(next),
            "illegal transition {} -> {}",
            self.current(),
            next
        );
        info!(from = %self.current(), to = %next, "Run state");
        self.states.push(next);
    }
}

/// One experiment run, built from a validated configuration.
pub struct Experiment {
    config: ExperimentConfig,
    runner: Arc<dyn CommandRunner>,
}

impl Experiment {
    /// Validate `config`. Fails with a usage error before anything is touched.
    pub fn new(config: ExperimentConfig, runner: Arc<dyn CommandRunner>) -> Result<Self> {
        config.validate()?;
        Ok(Experiment { config, runner })
    }

    pub fn config(&self) -> &ExperimentConfig {
        &self.config
    }

    /// Execute the run and commit its outcome.
    ///
    /// Stage failures do not surface as `Err`; they are recorded in the
    /// report's outcome and in the `F: ` commit. `Err` is returned only when
    /// the run log cannot be opened, before anything else happens.
    pub async fn run(&self) -> Result<RunReport> {
        let run_id = Uuid::new_v4().to_string();
        let span = run_span(&run_id, &self.config.env_name);
        self.run_with_id(run_id).instrument(span).await
    }

    async fn run_with_id(&self, run_id: String) -> Result<RunReport> {
        let mut log = RunLog::create(&self.config.log_path(), LOG_SOURCE)?;
        log.info(&format!("Starting run {run_id}"));

        let mut progress = Progress::new();
        if let Err(e) = self.stages(&mut progress, &mut log).await {
            log.error(&format!("Failed! {e}"));
            progress.outcome = RunOutcome::fail(e.to_string());
        }

        Ok(self.finalize(run_id, progress, log).await)
    }

    async fn stages(&self, progress: &mut Progress, log: &mut RunLog) -> Result<()> {
        let config = &self.config;

        let resolver = ToolResolver::with_candidates(config.candidates.iter().cloned())
            .probe_timeout_secs(config.probe_timeout_secs);
        let tool = resolver.resolve(self.runner.as_ref()).await?;
        log.info(&format!("Using environment manager {} ({})", tool, tool.version));
        progress.tool = Some(tool.program.clone());
        progress.advance(RunState::ToolResolved);

        let manager = EnvironmentManager::new(tool, self.runner.clone())
            .with_timeout_secs(config.command_timeout_secs);

        if manager.remove(&config.env_name).await {
            log.info(&format!("Removed environment {}", config.env_name));
        }
        progress.advance(RunState::EnvRemoved);

        self.create_environment(&manager, progress, log).await?;
        progress.advance(RunState::EnvCreated);

        let checks = TestRunner::new(manager, &config.env_name, &config.work_dir);

        if let Some((library, input_dir)) = config.scan_target() {
            let set = self.scan_imports(library, input_dir, log)?;
            progress.scan = Some(ScanSummary::from(&set));
            progress.advance(RunState::ImportsScanned);

            let imported = checks
                .run_import_check(&set.output_root, &set.package, log)
                .await?;
            log_stdout(log, &imported.output);
            progress.advance(RunState::ImportsTested);
        } else if config.scan_half_configured() {
            log.warn("Import check skipped: library and input_dir must be given together");
        }

        let tested = checks.run_user_test(&config.user_test, log).await?;
        log_stdout(log, &tested.output);
        progress.advance(RunState::UserTested);

        progress.outcome = RunOutcome::pass();
        Ok(())
    }

    /// Create the environment, then snapshot its dependencies whether or not
    /// creation succeeded.
    async fn create_environment(
        &self,
        manager: &EnvironmentManager,
        progress: &mut Progress,
        log: &mut RunLog,
    ) -> Result<()> {
        let config = &self.config;
        let env = EnvironmentDescriptor::new(config.env_name.as_str(), config.manifest_path());

        let created = manager.create(&env).await;
        match &created {
            Ok(out) => {
                log.info("Environment created successfully!");
                log_stdout(log, out);
            }
            Err(e) => log.error(&format!("Failed to create environment!\n{e}")),
        }

        let snapshotter = SnapshotLogger::new(&config.snapshot_path());
        match snapshotter.snapshot(manager, &env.name).await {
            Ok(snapshot) => {
                log.info(&format!(
                    "Logged {} packages, {} frozen requirements",
                    snapshot.packages.len(),
                    snapshot.freeze.len()
                ));
                progress.snapshot = Some(snapshot);
            }
            Err(e) => {
                log.warn(&format!("Dependency snapshot failed: {e}"));
                // A creation failure is the more useful diagnostic
                if created.is_ok() {
                    return Err(e.into());
                }
            }
        }

        created.map(|_| ()).map_err(ExperimentError::from)
    }

    fn scan_imports(
        &self,
        library: &str,
        input_dir: &Path,
        log: &mut RunLog,
    ) -> Result<ExtractedModuleSet> {
        let config = &self.config;
        let scanner = ImportScanner::new(library)
            .exclude(config.exclude.iter().cloned())
            .top_level_only(config.top_level_only)
            .extension(config.file_extension.as_str());

        let set = match scanner.scan(input_dir, &config.output_path()) {
            Ok(set) => set,
            Err(e) => {
                log.error(&format!("Import scan failed!\n{e}"));
                return Err(e);
            }
        };

        for open in &set.unterminated {
            log.warn(&format!(
                "Unterminated multi-line import dropped at {}:{}: {}",
                open.source_file.display(),
                open.line,
                open.text
            ));
        }
        log.info(&format!(
            "Extracted {} {} imports from {} of {} files",
            set.total_imports(),
            library,
            set.records.len(),
            set.files_scanned
        ));
        Ok(set)
    }

    /// Close the log, wait for it to land, commit. Runs once per run.
    async fn finalize(&self, run_id: String, mut progress: Progress, mut log: RunLog) -> RunReport {
        progress.advance(RunState::Finalized);
        let message = self.config.commit_message.as_deref().unwrap_or_default();
        let commit_message = progress.outcome.commit_message(message);

        let baseline = modified_time(log.path());
        if progress.outcome.passed() {
            log.info("Run passed");
        } else {
            log.error("Run failed");
        }
        if let Err(e) = log.close() {
            error!(path = %log.path().display(), error = %e, "Failed to close run log");
        }

        let log_synced = self
            .config
            .log_sync()
            .wait_for_update(log.path(), baseline)
            .await;
        if !log_synced {
            info!(path = %log.path().display(), "Log update not observed before timeout; committing anyway");
        }

        let recorder = CommitRecorder::new(self.runner.clone(), &self.config.work_dir);
        let (commit_sha, commit_error) = match recorder.commit_all(&commit_message).await {
            Ok(()) => (recorder.head_sha().await.ok(), None),
            Err(e) => {
                error!(error = %e, "Commit failed");
                (None, Some(e.to_string()))
            }
        };

        RunReport {
            run_id,
            states: progress.states,
            outcome: progress.outcome,
            tool: progress.tool,
            scan: progress.scan,
            snapshot: progress.snapshot,
            commit_message,
            log_synced,
            commit_sha,
            commit_error,
        }
    }
}

/// Record a passing command's stdout, if it printed anything.
fn log_stdout(log: &mut RunLog, output: &CommandOutput) {
    let stdout = output.stdout.trim();
    if !stdout.is_empty() {
        log.info(stdout);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conda_env_manager::fakes::ScriptedRunner;

    #[test]
    fn test_progress_starts_failed() {
        let progress = Progress::new();
        assert_eq!(progress.current(), RunState::Start);
        assert!(!progress.outcome.passed());
    }

    #[test]
    fn test_new_rejects_missing_commit_message() {
        let runner = Arc::new(ScriptedRunner::new());
        let result = Experiment::new(ExperimentConfig::default(), runner.clone());
        assert!(matches!(result, Err(ExperimentError::Usage(_))));
        assert!(runner.calls().is_empty());
    }

    #[test]
    fn test_report_last_state_before_finalize() {
        let report = RunReport {
            run_id: "r".to_string(),
            states: vec![RunState::Start, RunState::ToolResolved, RunState::Finalized],
            outcome: RunOutcome::fail("boom"),
            tool: None,
            scan: None,
            snapshot: None,
            commit_message: "F: x".to_string(),
            log_synced: true,
            commit_sha: None,
            commit_error: None,
        };
        assert_eq!(report.final_state_before_finalize(), Some(RunState::ToolResolved));
        assert!(report.committed());
        assert!(!report.passed());
    }

    #[tokio::test]
    async fn test_tool_not_found_still_commits() {
        let dir = tempfile::tempdir().unwrap();
        let runner = Arc::new(
            ScriptedRunner::new()
                .missing("mamba")
                .missing("micromamba")
                .missing("conda"),
        );
        let config = ExperimentConfig {
            commit_message: Some("try pyside6".to_string()),
            work_dir: dir.path().to_path_buf(),
            log_sync_timeout_ms: 200,
            log_sync_interval_ms: 10,
            ..Default::default()
        };

        let report = Experiment::new(config, runner.clone())
            .unwrap()
            .run()
            .await
            .unwrap();

        assert_eq!(report.states, vec![RunState::Start, RunState::Finalized]);
        assert!(report.commit_message.starts_with("F: try pyside6"));
        assert!(report.commit_message.contains("no usable environment manager"));

        let calls = runner.calls();
        assert!(!calls.iter().any(|c| c.contains(" env ")));
        assert_eq!(calls.iter().filter(|c| c.starts_with("git commit")).count(), 1);
    }
}
