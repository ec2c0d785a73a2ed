//! Integration tests for the environment lifecycle against real processes.
//!
//! A small shell script stands in for the environment manager so the
//! resolve -> remove -> create -> run -> snapshot path runs through
//! `ProcessRunner` without conda installed.

#![cfg(unix)]

use conda_env_manager::{
    EnvironmentDescriptor, EnvironmentManager, ProcessRunner, SnapshotLogger, ToolResolver,
};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

const FAKE_MANAGER: &str = r##"#!/bin/sh
case "$1" in
  --version) echo "fakeconda 0.1" ;;
  env)
    if [ "$2" = "create" ] && [ ! -f "$6" ]; then
      echo "EnvironmentFileNotFound: $6" >&2
      exit 1
    fi
    exit 0 ;;
  run) shift 3; exec "$@" ;;
  list) echo "# packages in environment"; echo ""; echo "python 3.11.8" ;;
  *) exit 2 ;;
esac
"##;

fn install_fake_manager(dir: &Path) -> PathBuf {
    let path = dir.join("fakeconda");
    std::fs::write(&path, FAKE_MANAGER).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

#[tokio::test]
async fn test_full_lifecycle_with_script_manager() {
    let dir = tempfile::tempdir().unwrap();
    let tool_path = install_fake_manager(dir.path());
    let manifest = dir.path().join("environment.yml");
    std::fs::write(&manifest, "name: experiment\ndependencies:\n  - python\n").unwrap();

    let runner = Arc::new(ProcessRunner);
    let resolver = ToolResolver::with_candidates([
        "definitely-missing-manager".to_string(),
        tool_path.to_string_lossy().to_string(),
    ]);
    let tool = resolver.resolve(runner.as_ref()).await.expect("resolve failed");
    assert_eq!(tool.version, "fakeconda 0.1");

    let manager = EnvironmentManager::new(tool, runner).with_timeout_secs(30);
    let env = EnvironmentDescriptor::new("experiment", &manifest);

    assert!(manager.remove("experiment").await);
    manager.create(&env).await.expect("create failed");

    let command = vec!["echo".to_string(), "inside".to_string()];
    let out = manager.run_in("experiment", &command, None).await.unwrap();
    assert!(out.success());
    assert_eq!(out.stdout.trim(), "inside");

    let logger = SnapshotLogger::new(dir.path());
    let snapshot = logger.snapshot(&manager, "experiment").await.unwrap();
    assert_eq!(
        snapshot.packages,
        vec!["# packages in environment", "python 3.11.8"]
    );
}

#[tokio::test]
async fn test_create_with_missing_manifest_fails() {
    let dir = tempfile::tempdir().unwrap();
    let tool_path = install_fake_manager(dir.path());

    let runner = Arc::new(ProcessRunner);
    let tool = ToolResolver::with_candidates([tool_path.to_string_lossy().to_string()])
        .resolve(runner.as_ref())
        .await
        .unwrap();
    let manager = EnvironmentManager::new(tool, runner);

    let env = EnvironmentDescriptor::new("experiment", dir.path().join("missing.yml"));
    let err = manager.create(&env).await.unwrap_err();
    assert!(err.to_string().contains("EnvironmentFileNotFound"));
}
