//! Run configuration.
//!
//! Values come from an optional TOML file and are then overridden by CLI
//! flags. Relative paths (other than `input_dir`) are resolved against
//! `work_dir`, the directory that holds the manifest and the git checkout.

use std::path::{Path, PathBuf};
use std::time::Duration;

use conda_env_manager::DEFAULT_CANDIDATES;
use serde::{Deserialize, Serialize};

use crate::domain::{ExperimentError, Result};
use crate::log_sync::LogSync;

/// Default configuration file name looked up in the working directory.
pub const CONFIG_FILE: &str = "envexp.toml";

/// Configuration for one experiment run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExperimentConfig {
    /// Library whose imports are extracted (e.g. `qtpy`)
    pub library: Option<String>,

    /// Source tree to scan for those imports
    pub input_dir: Option<PathBuf>,

    /// Commit message; tagged `P: `/`F: ` on commit
    pub commit_message: Option<String>,

    /// Name of the disposable environment
    pub env_name: String,

    /// Environment manifest
    pub manifest: PathBuf,

    /// Directory holding the manifest, the artifacts and the git checkout
    pub work_dir: PathBuf,

    /// Extracted package directory (default `experiment`)
    pub output_dir: Option<PathBuf>,

    /// Skip imports whose first line contains one of these
    pub exclude: Vec<String>,

    /// Ignore indented imports
    pub top_level_only: bool,

    /// Source extension to scan
    pub file_extension: String,

    /// Smoke-test command run inside the environment
    pub user_test: Vec<String>,

    /// Run log (default `test.log`)
    pub log_file: Option<PathBuf>,

    /// Directory for dependency reports (default `work_dir`)
    pub snapshot_dir: Option<PathBuf>,

    /// Environment managers to probe, highest priority first
    pub candidates: Vec<String>,

    pub probe_timeout_secs: u64,

    /// Timeout for every environment command; 0 = unbounded
    pub command_timeout_secs: u64,

    pub log_sync_timeout_ms: u64,
    pub log_sync_interval_ms: u64,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        ExperimentConfig {
            library: None,
            input_dir: None,
            commit_message: None,
            env_name: "experiment".to_string(),
            manifest: PathBuf::from("environment.yml"),
            work_dir: PathBuf::from("."),
            output_dir: None,
            exclude: Vec::new(),
            top_level_only: false,
            file_extension: "py".to_string(),
            user_test: vec!["python".to_string(), "smoke_test.py".to_string()],
            log_file: None,
            snapshot_dir: None,
            candidates: DEFAULT_CANDIDATES.iter().map(|c| c.to_string()).collect(),
            probe_timeout_secs: 30,
            command_timeout_secs: 3600,
            log_sync_timeout_ms: 10_000,
            log_sync_interval_ms: 500,
        }
    }
}

impl ExperimentConfig {
    /// Parse a TOML document; missing keys take their defaults.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| ExperimentError::Config(e.to_string()))
    }

    /// Load a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| ExperimentError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    /// Load `path` if given, else `envexp.toml` in the current directory if it
    /// exists, else defaults.
    pub fn discover(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::load(p),
            None if Path::new(CONFIG_FILE).is_file() => Self::load(Path::new(CONFIG_FILE)),
            None => Ok(Self::default()),
        }
    }

    /// Reject configurations that cannot run. Called before any side effect.
    pub fn validate(&self) -> Result<()> {
        match self.commit_message.as_deref() {
            Some(m) if !m.trim().is_empty() => {}
            _ => {
                return Err(ExperimentError::Usage(
                    "missing required commit message (--commit-message)".to_string(),
                ))
            }
        }
        if self.env_name.trim().is_empty() {
            return Err(ExperimentError::Usage("env_name must not be empty".to_string()));
        }
        if matches!(self.library.as_deref(), Some(l) if l.trim().is_empty()) {
            return Err(ExperimentError::Usage("library must not be empty".to_string()));
        }
        if self.user_test.is_empty() {
            return Err(ExperimentError::Usage("user_test command must not be empty".to_string()));
        }
        if self.candidates.is_empty() {
            return Err(ExperimentError::Usage("no environment manager candidates".to_string()));
        }
        Ok(())
    }

    /// `(library, input_dir)` when both are set; scanning is skipped otherwise.
    pub fn scan_target(&self) -> Option<(&str, &Path)> {
        match (self.library.as_deref(), self.input_dir.as_deref()) {
            (Some(library), Some(dir)) => Some((library, dir)),
            _ => None,
        }
    }

    /// Exactly one of `library`/`input_dir` was given.
    pub fn scan_half_configured(&self) -> bool {
        self.library.is_some() != self.input_dir.is_some()
    }

    fn in_work_dir(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.work_dir.join(path)
        }
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.in_work_dir(&self.manifest)
    }

    pub fn output_path(&self) -> PathBuf {
        self.in_work_dir(self.output_dir.as_deref().unwrap_or(Path::new("experiment")))
    }

    pub fn log_path(&self) -> PathBuf {
        self.in_work_dir(self.log_file.as_deref().unwrap_or(Path::new("test.log")))
    }

    pub fn snapshot_path(&self) -> PathBuf {
        self.in_work_dir(self.snapshot_dir.as_deref().unwrap_or(Path::new(".")))
    }

    pub fn log_sync(&self) -> LogSync {
        LogSync::new(
            Duration::from_millis(self.log_sync_interval_ms),
            Duration::from_millis(self.log_sync_timeout_ms),
        )
    }
}
