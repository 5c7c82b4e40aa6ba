// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent CLI adapters
//!
//! An [`AgentAdapter`] abstracts one external coding agent: spawning a
//! non-interactive run, resuming a session by id, and the session-file
//! conventions (encoded cwd, new-session detection, liveness). Behavior never
//! varies by string-sniffing outside this boundary; the [`AgentRegistry`]
//! maps an agent-type tag to an adapter instance.

mod claude;

pub use claude::ClaudeAgentAdapter;

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
mod fake;
#[cfg(any(test, feature = "test-support"))]
pub use fake::{AgentCall, FakeAgentAdapter};

use crate::session;
use crate::subprocess::CapturedOutput;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::oneshot;

/// The agent type used when neither node nor blueprint overrides it.
pub const DEFAULT_AGENT_TYPE: &str = "claude";

/// Errors from agent operations
#[derive(Debug, Error)]
pub enum AgentAdapterError {
    #[error("unknown agent type: {0}")]
    UnknownAgentType(String),
    #[error("spawn failed: {0}")]
    SpawnFailed(String),
    #[error("session error: {0}")]
    SessionError(String),
    #[error("project directory missing: {0}")]
    MissingProjectDir(String),
}

/// One agent invocation.
#[derive(Debug)]
pub struct AgentRunRequest {
    /// Full prompt text handed to the agent.
    pub prompt: String,
    /// Project working directory the agent runs in.
    pub cwd: PathBuf,
    /// Hard wall-clock budget; the subprocess is killed past it.
    pub timeout: Duration,
    /// Receives the CLI pid as soon as the process is spawned.
    pub pid_tx: Option<oneshot::Sender<u32>>,
}

impl AgentRunRequest {
    pub fn new(prompt: impl Into<String>, cwd: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            prompt: prompt.into(),
            cwd: cwd.into(),
            timeout,
            pid_tx: None,
        }
    }

    pub fn with_pid_tx(mut self, tx: oneshot::Sender<u32>) -> Self {
        self.pid_tx = Some(tx);
        self
    }
}

/// Captured result of an agent run.
#[derive(Debug, Clone)]
pub struct AgentRunOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
    pub timed_out: bool,
}

impl AgentRunOutput {
    pub fn exited_normally(&self) -> bool {
        !self.timed_out && self.exit_code == Some(0)
    }
}

impl From<CapturedOutput> for AgentRunOutput {
    fn from(out: CapturedOutput) -> Self {
        Self {
            stdout: out.stdout,
            stderr: out.stderr,
            exit_code: out.exit_code,
            timed_out: out.timed_out,
        }
    }
}

/// Adapter for one external coding agent CLI
#[async_trait]
pub trait AgentAdapter: std::fmt::Debug + Send + Sync {
    /// Tag this adapter is registered under (e.g. "claude").
    fn agent_type(&self) -> &str;

    /// Run one non-interactive session to completion.
    async fn run(&self, req: AgentRunRequest) -> Result<AgentRunOutput, AgentAdapterError>;

    /// Run an interactive session: the agent reports through HTTP callbacks
    /// rather than stdout markers (reevaluate/split/evaluate flows).
    async fn run_interactive(
        &self,
        req: AgentRunRequest,
    ) -> Result<AgentRunOutput, AgentAdapterError>;

    /// Resume an existing session by id with a continuation prompt.
    async fn resume(
        &self,
        session_id: &str,
        req: AgentRunRequest,
    ) -> Result<AgentRunOutput, AgentAdapterError>;

    /// Deterministic cwd → directory-segment mapping.
    fn encode_cwd(&self, cwd: &Path) -> String {
        session::encode_cwd(cwd)
    }

    /// Newest session file for `cwd` modified strictly after `since`.
    async fn detect_new_session(
        &self,
        cwd: &Path,
        since: DateTime<Utc>,
    ) -> Result<Option<String>, AgentAdapterError>;

    /// Whether the session file has been modified within `window`.
    async fn is_session_alive(
        &self,
        cwd: &Path,
        session_id: &str,
        window: Duration,
    ) -> Result<bool, AgentAdapterError>;
}

/// Process-wide registry: agent-type tag → adapter.
#[derive(Clone, Default)]
pub struct AgentRegistry {
    adapters: HashMap<String, Arc<dyn AgentAdapter>>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an adapter under its own tag.
    pub fn register(&mut self, adapter: Arc<dyn AgentAdapter>) {
        self.adapters
            .insert(adapter.agent_type().to_string(), adapter);
    }

    /// Resolve a tag, falling back to [`DEFAULT_AGENT_TYPE`] when absent.
    pub fn resolve(&self, tag: Option<&str>) -> Result<Arc<dyn AgentAdapter>, AgentAdapterError> {
        let tag = tag.unwrap_or(DEFAULT_AGENT_TYPE);
        self.adapters
            .get(tag)
            .cloned()
            .ok_or_else(|| AgentAdapterError::UnknownAgentType(tag.to_string()))
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
