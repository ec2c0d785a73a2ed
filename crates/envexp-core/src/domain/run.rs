//! Run lifecycle states and outcome.

use serde::{Deserialize, Serialize};

/// States of one experiment run, in the order they are entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Start,
    ToolResolved,
    EnvRemoved,
    EnvCreated,
    ImportsScanned,
    ImportsTested,
    UserTested,
    Finalized,
}

impl RunState {
    /// Whether `next` may follow `self`.
    ///
    /// Every non-final state may jump straight to `Finalized`. The import
    /// states are skipped when no scan was requested.
    pub fn can_transition_to(self, next: RunState) -> bool {
        use RunState::*;
        match (self, next) {
            (Finalized, _) => false,
            (_, Finalized) => true,
            (Start, ToolResolved)
            | (ToolResolved, EnvRemoved)
            | (EnvRemoved, EnvCreated)
            | (EnvCreated, ImportsScanned)
            | (EnvCreated, UserTested)
            | (ImportsScanned, ImportsTested)
            | (ImportsTested, UserTested) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RunState::Start => "START",
            RunState::ToolResolved => "TOOL_RESOLVED",
            RunState::EnvRemoved => "ENV_REMOVED",
            RunState::EnvCreated => "ENV_CREATED",
            RunState::ImportsScanned => "IMPORTS_SCANNED",
            RunState::ImportsTested => "IMPORTS_TESTED",
            RunState::UserTested => "USER_TESTED",
            RunState::Finalized => "FINALIZED",
        };
        write!(f, "{s}")
    }
}

/// Pass/fail verdict of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Pass,
    Fail,
}

impl Verdict {
    /// Commit message prefix.
    pub fn tag(self) -> &'static str {
        match self {
            Verdict::Pass => "P: ",
            Verdict::Fail => "F: ",
        }
    }
}

/// Outcome of a run, with the failing step's diagnostic if there was one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunOutcome {
    pub verdict: Verdict,
    pub detail: Option<String>,
}

impl Default for RunOutcome {
    /// A run counts as failed until every stage has reported in.
    fn default() -> Self {
        RunOutcome {
            verdict: Verdict::Fail,
            detail: None,
        }
    }
}

impl RunOutcome {
    pub fn pass() -> Self {
        RunOutcome {
            verdict: Verdict::Pass,
            detail: None,
        }
    }

    pub fn fail(detail: impl Into<String>) -> Self {
        RunOutcome {
            verdict: Verdict::Fail,
            detail: Some(detail.into()),
        }
    }

    pub fn passed(&self) -> bool {
        self.verdict == Verdict::Pass
    }

    /// `message` tagged with the verdict; a failure detail goes in the body.
    pub fn commit_message(&self, message: &str) -> String {
        let subject = format!("{}{}", self.verdict.tag(), message);
        match &self.detail {
            Some(detail) if !detail.trim().is_empty() => {
                format!("{subject}\n\n{}", detail.trim())
            }
            _ => subject,
        }
    }
}
