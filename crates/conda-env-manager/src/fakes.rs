//! In-memory command runner (testing only)
//!
//! `ScriptedRunner` answers commands from a rule table and records every
//! invocation, so environment workflows can be tested without conda or git.

use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::CondaError;
use crate::runner::{CommandOutput, CommandRunner, CommandSpec};
use crate::Result;

#[derive(Debug, Clone)]
enum Reply {
    Output(CommandOutput),
    Missing,
}

#[derive(Debug, Clone)]
struct Rule {
    prefix: String,
    reply: Reply,
}

/// Fake runner matching commands by the prefix of their display form.
///
/// Rules are checked in insertion order; the first match wins. Unmatched
/// commands succeed with empty output.
#[derive(Debug, Default)]
pub struct ScriptedRunner {
    rules: Vec<Rule>,
    calls: Mutex<Vec<CommandSpec>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer commands starting with `prefix`.
    pub fn on(mut self, prefix: &str, exit_code: i32, stdout: &str, stderr: &str) -> Self {
        self.rules.push(Rule {
            prefix: prefix.to_string(),
            reply: Reply::Output(CommandOutput {
                exit_code,
                stdout: stdout.to_string(),
                stderr: stderr.to_string(),
                duration_ms: 0,
            }),
        });
        self
    }

    /// Fail to spawn `program`, as if it were not installed.
    pub fn missing(mut self, program: &str) -> Self {
        self.rules.push(Rule {
            prefix: format!("{program} "),
            reply: Reply::Missing,
        });
        self
    }

    /// Display form of every command run so far, in order.
    pub fn calls(&self) -> Vec<String> {
        self.specs().iter().map(CommandSpec::display).collect()
    }

    /// Every command run so far, in order.
    pub fn specs(&self) -> Vec<CommandSpec> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput> {
        self.calls.lock().unwrap().push(spec.clone());

        // Pad so a bare program name still matches a `missing()` rule
        let line = format!("{} ", spec.display());
        let rule = self.rules.iter().find(|r| line.starts_with(&r.prefix));

        match rule.map(|r| &r.reply) {
            Some(Reply::Output(out)) => Ok(out.clone()),
            Some(Reply::Missing) => Err(CondaError::Spawn {
                program: spec.program.clone(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "not installed"),
            }),
            None => Ok(CommandOutput::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_first_matching_rule_wins() {
        let runner = ScriptedRunner::new()
            .on("git commit", 1, "", "nothing to commit")
            .on("git", 0, "ok", "");

        let out = runner
            .run(&CommandSpec::new("git").args(["commit", "-m", "x"]))
            .await
            .unwrap();
        assert_eq!(out.exit_code, 1);

        let out = runner
            .run(&CommandSpec::new("git").args(["add", "."]))
            .await
            .unwrap();
        assert_eq!(out.stdout, "ok");
        assert_eq!(runner.calls(), vec!["git commit -m x", "git add ."]);
    }

    #[tokio::test]
    async fn test_missing_program() {
        let runner = ScriptedRunner::new().missing("mamba");
        let result = runner.run(&CommandSpec::new("mamba")).await;
        assert!(matches!(result, Err(CondaError::Spawn { .. })));

        // A longer program sharing the prefix is unaffected
        let result = runner.run(&CommandSpec::new("mambaforge")).await;
        assert!(result.is_ok());
    }
}
