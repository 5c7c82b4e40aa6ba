// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fake agent adapter for deterministic testing
#![cfg_attr(coverage_nightly, coverage(off))]

use super::{AgentAdapter, AgentAdapterError, AgentRunOutput, AgentRunRequest};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Recorded call to FakeAgentAdapter
#[derive(Debug, Clone)]
pub enum AgentCall {
    Run { prompt: String, cwd: PathBuf },
    RunInteractive { prompt: String, cwd: PathBuf },
    Resume { session_id: String, prompt: String },
    DetectSession { cwd: PathBuf },
    IsAlive { session_id: String },
}

type RunHook = Arc<dyn Fn(&AgentRunRequest) + Send + Sync>;

struct FakeState {
    run_results: VecDeque<Result<AgentRunOutput, AgentAdapterError>>,
    detect_results: VecDeque<Option<String>>,
    alive_sessions: HashMap<String, bool>,
    calls: Vec<AgentCall>,
    run_hook: Option<RunHook>,
    report_pid: Option<u32>,
}

/// Fake agent adapter for testing
///
/// Scripts run outputs and session detection, records every call, and can
/// invoke a hook mid-run so tests simulate the agent's HTTP callbacks.
#[derive(Clone)]
pub struct FakeAgentAdapter {
    inner: Arc<Mutex<FakeState>>,
}

impl std::fmt::Debug for FakeAgentAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FakeAgentAdapter").finish_non_exhaustive()
    }
}

impl Default for FakeAgentAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeAgentAdapter {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(FakeState {
                run_results: VecDeque::new(),
                detect_results: VecDeque::new(),
                alive_sessions: HashMap::new(),
                calls: Vec::new(),
                run_hook: None,
                report_pid: Some(4242),
            })),
        }
    }

    /// Queue the next run/resume result.
    pub fn push_run_output(&self, output: AgentRunOutput) {
        self.inner.lock().run_results.push_back(Ok(output));
    }

    /// Queue the next run/resume error.
    pub fn push_run_error(&self, error: AgentAdapterError) {
        self.inner.lock().run_results.push_back(Err(error));
    }

    /// Convenience: queue a normal exit with the given stdout.
    pub fn push_stdout(&self, stdout: impl Into<String>) {
        self.push_run_output(AgentRunOutput {
            stdout: stdout.into(),
            stderr: String::new(),
            exit_code: Some(0),
            timed_out: false,
        });
    }

    /// Queue the next detect-new-session answer.
    pub fn push_detected_session(&self, session_id: Option<&str>) {
        self.inner
            .lock()
            .detect_results
            .push_back(session_id.map(|s| s.to_string()));
    }

    pub fn set_alive(&self, session_id: &str, alive: bool) {
        self.inner
            .lock()
            .alive_sessions
            .insert(session_id.to_string(), alive);
    }

    /// Run `hook` inside each run/resume call, before the scripted result is
    /// returned. Lets tests write callback rows mid-execution.
    pub fn set_run_hook(&self, hook: impl Fn(&AgentRunRequest) + Send + Sync + 'static) {
        self.inner.lock().run_hook = Some(Arc::new(hook));
    }

    /// Stop reporting a fake pid through `pid_tx`.
    pub fn suppress_pid(&self) {
        self.inner.lock().report_pid = None;
    }

    pub fn calls(&self) -> Vec<AgentCall> {
        self.inner.lock().calls.clone()
    }

    pub fn run_count(&self) -> usize {
        self.inner
            .lock()
            .calls
            .iter()
            .filter(|c| matches!(c, AgentCall::Run { .. } | AgentCall::Resume { .. }))
            .count()
    }

    fn consume_run(
        &self,
        mut req: AgentRunRequest,
        call: AgentCall,
    ) -> Result<AgentRunOutput, AgentAdapterError> {
        let (result, hook, pid) = {
            let mut state = self.inner.lock();
            state.calls.push(call);
            let result = state.run_results.pop_front();
            (result, state.run_hook.clone(), state.report_pid)
        };

        if let (Some(tx), Some(pid)) = (req.pid_tx.take(), pid) {
            let _ = tx.send(pid);
        }
        if let Some(hook) = hook {
            hook(&req);
        }

        result.unwrap_or_else(|| {
            Ok(AgentRunOutput {
                stdout: "ok: fake agent completed the task with no script".to_string(),
                stderr: String::new(),
                exit_code: Some(0),
                timed_out: false,
            })
        })
    }
}

#[async_trait]
impl AgentAdapter for FakeAgentAdapter {
    fn agent_type(&self) -> &str {
        "fake"
    }

    async fn run(&self, req: AgentRunRequest) -> Result<AgentRunOutput, AgentAdapterError> {
        let call = AgentCall::Run {
            prompt: req.prompt.clone(),
            cwd: req.cwd.clone(),
        };
        self.consume_run(req, call)
    }

    async fn run_interactive(
        &self,
        req: AgentRunRequest,
    ) -> Result<AgentRunOutput, AgentAdapterError> {
        let call = AgentCall::RunInteractive {
            prompt: req.prompt.clone(),
            cwd: req.cwd.clone(),
        };
        self.consume_run(req, call)
    }

    async fn resume(
        &self,
        session_id: &str,
        req: AgentRunRequest,
    ) -> Result<AgentRunOutput, AgentAdapterError> {
        let call = AgentCall::Resume {
            session_id: session_id.to_string(),
            prompt: req.prompt.clone(),
        };
        self.consume_run(req, call)
    }

    async fn detect_new_session(
        &self,
        cwd: &Path,
        _since: DateTime<Utc>,
    ) -> Result<Option<String>, AgentAdapterError> {
        let mut state = self.inner.lock();
        state.calls.push(AgentCall::DetectSession {
            cwd: cwd.to_path_buf(),
        });
        Ok(state.detect_results.pop_front().flatten())
    }

    async fn is_session_alive(
        &self,
        _cwd: &Path,
        session_id: &str,
        _window: Duration,
    ) -> Result<bool, AgentAdapterError> {
        let mut state = self.inner.lock();
        state.calls.push(AgentCall::IsAlive {
            session_id: session_id.to_string(),
        });
        Ok(*state.alive_sessions.get(session_id).unwrap_or(&false))
    }
}

#[cfg(test)]
#[path = "fake_tests.rs"]
mod tests;
