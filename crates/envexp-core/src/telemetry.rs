//! Process-wide tracing setup and run-scoped spans.
//!
//! The run log file is owned by [`crate::run_log::RunLog`]; this module only
//! configures where `tracing` events go (stdout) and how they look.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Install the global subscriber.
///
/// `RUST_LOG` takes precedence over `level`. With `json` set, events are
/// emitted as newline-delimited JSON. Later calls are no-ops.
pub fn init_tracing(json: bool, level: Level) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));
    let registry = tracing_subscriber::registry().with(env_filter);

    let result = if json {
        registry
            .with(fmt::layer().with_target(false).json())
            .try_init()
    } else {
        registry
            .with(fmt::layer().with_target(false).compact())
            .try_init()
    };
    // Already initialised (tests, embedding binaries)
    result.ok();
}

/// Span tagged with the run id and environment name. The orchestrator attaches
/// it to the whole run with `Instrument`.
pub fn run_span(run_id: &str, env_name: &str) -> tracing::Span {
    tracing::info_span!("envexp.run", run_id = %run_id, env = %env_name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_tracing_twice_is_harmless() {
        init_tracing(false, Level::INFO);
        init_tracing(true, Level::DEBUG);
    }

    #[test]
    fn test_run_span_name() {
        init_tracing(false, Level::INFO);
        let span = run_span("run-1", "experiment");
        if let Some(meta) = span.metadata() {
            assert_eq!(meta.name(), "envexp.run");
        }
    }
}
