//! Error types for conda-env-manager

use thiserror::Error;

/// Errors that can occur while driving a conda-family environment manager
#[derive(Error, Debug)]
pub enum CondaError {
    /// None of the candidate tools answered its version probe
    #[error("no environment manager found (tried: {})", .tried.join(", "))]
    ToolNotFound { tried: Vec<String> },

    /// `env create` exited non-zero
    #[error("failed to create environment {name}: {stderr}")]
    EnvironmentCreate { name: String, stderr: String },

    /// The process could not be spawned at all
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The process outlived its timeout and was killed
    #[error("{program} timed out after {secs} seconds")]
    Timeout { program: String, secs: u64 },

    /// Command was built without a program
    #[error("empty command")]
    EmptyCommand,

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
