//! Domain types shared across envexp.

pub mod error;
pub mod run;

pub use error::{CheckKind, ExperimentError, Result};
pub use run::{RunOutcome, RunState, Verdict};
