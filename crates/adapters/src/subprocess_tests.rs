// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[tokio::test]
async fn captures_stdout_and_exit_code() {
    let mut cmd = Command::new("sh");
    cmd.args(["-c", "echo hello"]);
    let out = run_captured(cmd, Duration::from_secs(5), None).await.unwrap();
    assert_eq!(out.stdout.trim(), "hello");
    assert_eq!(out.exit_code, Some(0));
    assert!(out.success());
}

#[tokio::test]
async fn reports_nonzero_exit() {
    let mut cmd = Command::new("sh");
    cmd.args(["-c", "echo oops >&2; exit 3"]);
    let out = run_captured(cmd, Duration::from_secs(5), None).await.unwrap();
    assert_eq!(out.exit_code, Some(3));
    assert_eq!(out.stderr.trim(), "oops");
    assert!(!out.success());
}

#[tokio::test]
async fn timeout_kills_child_and_flags_result() {
    let mut cmd = Command::new("sleep");
    cmd.arg("30");
    let out = run_captured(cmd, Duration::from_millis(100), None)
        .await
        .unwrap();
    assert!(out.timed_out);
    assert!(!out.success());
}

#[tokio::test]
async fn pid_is_reported_before_completion() {
    let (tx, rx) = oneshot::channel();
    let mut cmd = Command::new("sh");
    cmd.args(["-c", "echo done"]);
    let out = run_captured(cmd, Duration::from_secs(5), Some(tx)).await.unwrap();
    let pid = rx.await.unwrap();
    assert!(pid > 0);
    assert!(out.success());
}

#[tokio::test]
async fn spawn_failure_is_an_error() {
    let cmd = Command::new("/nonexistent/agent-binary");
    let err = run_captured(cmd, Duration::from_secs(1), None).await.unwrap_err();
    assert!(err.contains("failed to spawn"));
}

#[test]
fn truncation_appends_marker() {
    let big = vec![b'x'; CAPTURE_LIMIT_BYTES + 10];
    let s = truncate_lossy(&big, CAPTURE_LIMIT_BYTES);
    assert!(s.ends_with("[output truncated]"));
    assert!(s.len() <= CAPTURE_LIMIT_BYTES + 32);
}
