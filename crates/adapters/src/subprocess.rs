// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Subprocess execution helpers

use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::sync::oneshot;

/// Upper bound on captured stdout/stderr per stream.
pub const CAPTURE_LIMIT_BYTES: usize = 1024 * 1024;

/// Default wall-clock budget for one node execution.
pub const NODE_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Outcome of a captured subprocess run.
#[derive(Debug, Clone)]
pub struct CapturedOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
    /// The wall-clock budget elapsed; the child was killed.
    pub timed_out: bool,
}

impl CapturedOutput {
    pub fn success(&self) -> bool {
        !self.timed_out && self.exit_code == Some(0)
    }
}

/// Run a command with a hard timeout and size-bounded output capture.
///
/// The child's pid is reported through `pid_tx` as soon as the process is
/// spawned, before any waiting happens, so callers can persist it. On timeout
/// the child is killed (`kill_on_drop`) and a `timed_out` result is returned
/// instead of an error; spawn failures are the only `Err` case.
pub async fn run_captured(
    mut cmd: Command,
    timeout: Duration,
    pid_tx: Option<oneshot::Sender<u32>>,
) -> Result<CapturedOutput, String> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let child = cmd
        .spawn()
        .map_err(|e| format!("failed to spawn agent process: {e}"))?;

    if let (Some(tx), Some(pid)) = (pid_tx, child.id()) {
        let _ = tx.send(pid);
    }

    match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(Ok(output)) => Ok(CapturedOutput {
            stdout: truncate_lossy(&output.stdout, CAPTURE_LIMIT_BYTES),
            stderr: truncate_lossy(&output.stderr, CAPTURE_LIMIT_BYTES),
            exit_code: output.status.code(),
            timed_out: false,
        }),
        Ok(Err(io_err)) => Err(format!("agent process wait failed: {io_err}")),
        Err(_elapsed) => Ok(CapturedOutput {
            stdout: String::new(),
            stderr: String::new(),
            exit_code: None,
            timed_out: true,
        }),
    }
}

/// Lossy UTF-8 conversion capped at `limit` bytes.
fn truncate_lossy(bytes: &[u8], limit: usize) -> String {
    if bytes.len() <= limit {
        String::from_utf8_lossy(bytes).into_owned()
    } else {
        let mut s = String::from_utf8_lossy(&bytes[..limit]).into_owned();
        s.push_str("\n[output truncated]");
        s
    }
}

#[cfg(test)]
#[path = "subprocess_tests.rs"]
mod tests;
