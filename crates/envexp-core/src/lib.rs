//! envexp core library
//!
//! Extracts a library's import surface from a source tree into a smoke-test
//! package and runs the experiment lifecycle around it: rebuild the
//! environment, check imports, run the user's smoke test, snapshot
//! dependencies, and commit the outcome.

pub mod config;
pub mod domain;
pub mod git;
pub mod log_sync;
pub mod orchestrator;
pub mod run_log;
pub mod scan;
pub mod telemetry;
pub mod test_runner;

pub use config::{ExperimentConfig, CONFIG_FILE};
pub use domain::{CheckKind, ExperimentError, Result, RunOutcome, RunState, Verdict};
pub use git::CommitRecorder;
pub use log_sync::{modified_time, LogSync};
pub use orchestrator::{Experiment, RunReport, ScanSummary};
pub use run_log::{LogEntry, RunLog};
pub use scan::{
    ExtractedModuleSet, FileImports, ImportRecord, ImportScanner, UnterminatedImport,
    AGGREGATOR_FILE,
};
pub use telemetry::init_tracing;
pub use test_runner::{TestResult, TestRunner};

/// envexp version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
