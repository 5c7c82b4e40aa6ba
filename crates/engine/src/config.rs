// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Engine tunables

use std::time::Duration;

/// Default wall-clock budget for one node execution.
pub const DEFAULT_NODE_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Absolute deadline for recovery-monitored executions, measured from their
/// original start.
pub const MONITOR_DEADLINE: Duration = Duration::from_secs(45 * 60);

/// How often the recovery monitor re-checks liveness.
pub const MONITOR_INTERVAL: Duration = Duration::from_secs(30);

/// How long a finished run waits for the evaluation callback before treating
/// the result as COMPLETE with no mutations.
pub const EVALUATION_GRACE: Duration = Duration::from_secs(10);

/// Lookback window for reverting false "server restarted" failures.
pub const FALSE_FAILURE_LOOKBACK: Duration = Duration::from_secs(10 * 60);

/// Executor configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Base URL agents POST callbacks to, e.g. `http://127.0.0.1:7410`.
    pub callback_base: String,
    pub node_timeout: Duration,
    pub monitor_deadline: Duration,
    pub monitor_interval: Duration,
    pub evaluation_grace: Duration,
    /// Session-alive heuristic window; 2× the node timeout unless overridden.
    pub session_alive_window: Duration,
    /// Deprecated echo-strip fallback for summaries when neither a callback
    /// nor a completion block exists. Off unless explicitly enabled.
    pub strip_echoed_prompt: bool,
}

impl EngineConfig {
    pub fn new(callback_base: impl Into<String>) -> Self {
        Self {
            callback_base: callback_base.into(),
            node_timeout: DEFAULT_NODE_TIMEOUT,
            monitor_deadline: MONITOR_DEADLINE,
            monitor_interval: MONITOR_INTERVAL,
            evaluation_grace: EVALUATION_GRACE,
            session_alive_window: DEFAULT_NODE_TIMEOUT * 2,
            strip_echoed_prompt: false,
        }
    }

    /// Shrink every wait to test scale.
    pub fn for_tests(callback_base: impl Into<String>) -> Self {
        Self {
            node_timeout: Duration::from_secs(5),
            monitor_deadline: Duration::from_secs(10),
            monitor_interval: Duration::from_millis(50),
            evaluation_grace: Duration::from_millis(200),
            session_alive_window: Duration::from_secs(10),
            ..Self::new(callback_base)
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new("http://127.0.0.1:7410")
    }
}
