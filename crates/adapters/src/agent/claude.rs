// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Claude Code agent adapter

use super::{AgentAdapter, AgentAdapterError, AgentRunOutput, AgentRunRequest};
use crate::session;
use crate::subprocess::run_captured;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::process::Command;

/// Adapter driving the `claude` CLI in print mode.
///
/// Session files land under `<home>/projects/<encoded-cwd>/<session>.jsonl`,
/// written by the CLI itself; this adapter only ever reads them.
pub struct ClaudeAgentAdapter {
    command: String,
    home: PathBuf,
}

impl std::fmt::Debug for ClaudeAgentAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClaudeAgentAdapter")
            .field("command", &self.command)
            .field("home", &self.home)
            .finish()
    }
}

impl ClaudeAgentAdapter {
    pub fn new() -> Self {
        let home = dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".claude");
        Self {
            command: "claude".to_string(),
            home,
        }
    }

    /// Override the CLI binary (tests, alternate installs).
    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.command = command.into();
        self
    }

    /// Override the agent's config home.
    pub fn with_home(mut self, home: impl Into<PathBuf>) -> Self {
        self.home = home.into();
        self
    }

    fn sessions_dir(&self, cwd: &Path) -> PathBuf {
        session::sessions_dir(&self.home, cwd)
    }

    async fn run_command(
        &self,
        req: AgentRunRequest,
        extra_args: &[&str],
        text_only: bool,
    ) -> Result<AgentRunOutput, AgentAdapterError> {
        if !req.cwd.is_dir() {
            return Err(AgentAdapterError::MissingProjectDir(
                req.cwd.display().to_string(),
            ));
        }

        let mut cmd = Command::new(&self.command);
        cmd.arg("-p");
        cmd.args(extra_args);
        if text_only {
            cmd.args(["--output-format", "text"]);
        }
        cmd.arg(&req.prompt);
        cmd.current_dir(&req.cwd);

        tracing::debug!(
            command = %self.command,
            cwd = %req.cwd.display(),
            timeout_secs = req.timeout.as_secs(),
            "spawning claude agent"
        );

        let output = run_captured(cmd, req.timeout, req.pid_tx)
            .await
            .map_err(AgentAdapterError::SpawnFailed)?;

        if output.timed_out {
            tracing::warn!(cwd = %req.cwd.display(), "claude agent run timed out");
        }

        Ok(output.into())
    }
}

impl Default for ClaudeAgentAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AgentAdapter for ClaudeAgentAdapter {
    fn agent_type(&self) -> &str {
        "claude"
    }

    async fn run(&self, req: AgentRunRequest) -> Result<AgentRunOutput, AgentAdapterError> {
        self.run_command(req, &[], true).await
    }

    async fn run_interactive(
        &self,
        req: AgentRunRequest,
    ) -> Result<AgentRunOutput, AgentAdapterError> {
        // Interactive flows report through HTTP callbacks; stdout format is
        // left to the CLI default.
        self.run_command(req, &[], false).await
    }

    async fn resume(
        &self,
        session_id: &str,
        req: AgentRunRequest,
    ) -> Result<AgentRunOutput, AgentAdapterError> {
        self.run_command(req, &["--resume", session_id], true).await
    }

    async fn detect_new_session(
        &self,
        cwd: &Path,
        since: DateTime<Utc>,
    ) -> Result<Option<String>, AgentAdapterError> {
        session::detect_new_session(&self.sessions_dir(cwd), since)
            .await
            .map_err(|e| AgentAdapterError::SessionError(e.to_string()))
    }

    async fn is_session_alive(
        &self,
        cwd: &Path,
        session_id: &str,
        window: Duration,
    ) -> Result<bool, AgentAdapterError> {
        Ok(session::is_session_alive(&self.sessions_dir(cwd), session_id, Utc::now(), window).await)
    }
}

#[cfg(test)]
#[path = "claude_tests.rs"]
mod tests;
