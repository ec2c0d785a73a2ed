//! conda-env-manager: disposable conda-family environments for envexp
//!
//! This crate provides the environment layer for envexp. It finds a usable
//! environment manager (`mamba`, `micromamba` or `conda`), tears down and
//! rebuilds a named environment from a manifest, runs commands inside it and
//! records what got installed.
//!
//! All process execution goes through the [`CommandRunner`] trait.

pub mod environment;
pub mod error;
pub mod fakes;
pub mod resolver;
pub mod runner;
pub mod snapshot;

pub use environment::{EnvironmentDescriptor, EnvironmentManager};
pub use error::CondaError;
pub use resolver::{CondaTool, ToolResolver, DEFAULT_CANDIDATES};
pub use runner::{CommandOutput, CommandRunner, CommandSpec, ProcessRunner};
pub use snapshot::{DependencySnapshot, SnapshotLogger, PACKAGE_LIST_FILE, PIP_FREEZE_FILE};

/// Result type for environment manager operations
pub type Result<T> = std::result::Result<T, CondaError>;
