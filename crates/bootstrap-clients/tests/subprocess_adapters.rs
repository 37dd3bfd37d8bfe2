//! Subprocess adapters driven against stand-in scripts.

#![cfg(unix)]

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use bootstrap_clients::{ClientConfig, GclientEvaluator, PatchCommand};
use bootstrap_services::{ManifestEvaluator, Patcher, ServiceError};
use tokio::sync::mpsc;

fn write_script(path: &Path, body: &str) {
    std::fs::write(path, format!("#!/bin/sh\n{body}\n")).unwrap();
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).unwrap();
}

#[tokio::test]
async fn test_gclient_tool_dir_arrives_over_channel() {
    let tools = tempfile::tempdir().unwrap();
    write_script(
        &tools.path().join("gclient"),
        r#"case "$5" in
  src/v8) echo "abc123" ;;
  *) echo "Error: Could not find any dependency called $5." >&2; exit 1 ;;
esac"#,
    );

    let (tx, rx) = mpsc::channel::<PathBuf>(1);
    let evaluator = GclientEvaluator::from_channel(rx);
    tx.send(tools.path().to_path_buf()).await.unwrap();

    let pin = evaluator.evaluate("deps = {}", "src/v8").await.unwrap();
    assert_eq!(pin.as_deref(), Some("abc123"));

    // The directory is remembered after the first evaluation.
    drop(tx);
    let missing = evaluator.evaluate("deps = {}", "src/other").await.unwrap();
    assert_eq!(missing, None);
}

#[tokio::test]
async fn test_gclient_failure_is_upstream_error() {
    let tools = tempfile::tempdir().unwrap();
    write_script(
        &tools.path().join("gclient"),
        r#"echo "SyntaxError: invalid syntax" >&2; exit 2"#,
    );
    let evaluator = GclientEvaluator::new(tools.path());
    let err = evaluator.evaluate("deps = {", "src/v8").await.unwrap_err();
    assert!(matches!(err, ServiceError::Upstream(ref m) if m.contains("invalid syntax")));
}

#[tokio::test]
async fn test_patch_exit_one_is_rejection() {
    let tools = tempfile::tempdir().unwrap();
    let binary = tools.path().join("patch");
    write_script(&binary, r#"echo "1 out of 1 hunk FAILED"; exit 1"#);

    let config = ClientConfig {
        patch_binary: binary,
        ..ClientConfig::default()
    };
    let err = PatchCommand::new(&config)
        .apply("{}", "@@ -1 +1 @@\n-{}\n+{\"a\": 1}\n")
        .await
        .unwrap_err();
    assert!(err.is_patch_rejected());
    assert!(err.to_string().contains("hunk FAILED"));
}

#[tokio::test]
async fn test_patch_success_returns_target_contents() {
    let tools = tempfile::tempdir().unwrap();
    let binary = tools.path().join("patch");
    // Arguments: --silent --force --reject-file=- TARGET -i DIFF
    write_script(&binary, r#"printf 'patched' > "$4""#);

    let config = ClientConfig {
        patch_binary: binary,
        ..ClientConfig::default()
    };
    let patched = PatchCommand::new(&config).apply("original", "diff").await.unwrap();
    assert_eq!(patched, "patched");
}

#[tokio::test]
async fn test_missing_patch_binary_is_io_error() {
    let config = ClientConfig {
        patch_binary: PathBuf::from("/nonexistent/patch"),
        ..ClientConfig::default()
    };
    let err = PatchCommand::new(&config).apply("a", "b").await.unwrap_err();
    assert!(matches!(err, ServiceError::Io(_)));
}
