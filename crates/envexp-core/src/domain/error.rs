//! Error taxonomy for envexp runs.

use std::path::PathBuf;

use conda_env_manager::CondaError;

/// Which in-environment check failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckKind {
    Imports,
    UserTest,
}

impl std::fmt::Display for CheckKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CheckKind::Imports => write!(f, "import check"),
            CheckKind::UserTest => write!(f, "user test"),
        }
    }
}

/// envexp errors.
#[derive(Debug, thiserror::Error)]
pub enum ExperimentError {
    #[error("no usable environment manager (tried: {})", .tried.join(", "))]
    ToolNotFound { tried: Vec<String> },

    #[error("environment creation failed: {stderr}")]
    EnvironmentCreate { stderr: String },

    #[error("scan io error at {}: {source}", .path.display())]
    ScanIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{check} failed: {detail}")]
    TestFailed { check: CheckKind, detail: String },

    #[error("usage error: {0}")]
    Usage(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("git error: {0}")]
    Git(String),

    #[error("environment manager error: {0}")]
    Conda(CondaError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ExperimentError {
    pub(crate) fn scan_io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ExperimentError::ScanIo {
            path: path.into(),
            source,
        }
    }
}

impl From<CondaError> for ExperimentError {
    fn from(err: CondaError) -> Self {
        match err {
            CondaError::ToolNotFound { tried } => ExperimentError::ToolNotFound { tried },
            CondaError::EnvironmentCreate { stderr, .. } => {
                ExperimentError::EnvironmentCreate { stderr }
            }
            other => ExperimentError::Conda(other),
        }
    }
}

/// Result type for envexp operations.
pub type Result<T> = std::result::Result<T, ExperimentError>;
