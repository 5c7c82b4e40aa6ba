// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Node executions: one attempt at running a node

use crate::blueprint::BlueprintId;
use crate::node::NodeId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

crate::define_id! {
    /// Unique identifier for an execution attempt.
    #[derive(Default)]
    pub struct ExecutionId;
}

/// Kind of execution attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionKind {
    /// First (or user-retried) attempt at a node.
    Primary,
    /// Session-resume of a failed execution, linked via `parent_execution_id`.
    Retry,
    Continuation,
    Subtask,
}

impl ExecutionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionKind::Primary => "primary",
            ExecutionKind::Retry => "retry",
            ExecutionKind::Continuation => "continuation",
            ExecutionKind::Subtask => "subtask",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "primary" => Some(ExecutionKind::Primary),
            "retry" => Some(ExecutionKind::Retry),
            "continuation" => Some(ExecutionKind::Continuation),
            "subtask" => Some(ExecutionKind::Subtask),
            _ => None,
        }
    }
}

/// Status of an execution row.
///
/// `running` is never a valid resting state across restarts; recovery
/// triages any row still running at boot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Running,
    Done,
    Failed,
    Cancelled,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStatus::Running => "running",
            ExecutionStatus::Done => "done",
            ExecutionStatus::Failed => "failed",
            ExecutionStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "running" => Some(ExecutionStatus::Running),
            "done" => Some(ExecutionStatus::Done),
            "failed" => Some(ExecutionStatus::Failed),
            "cancelled" => Some(ExecutionStatus::Cancelled),
            _ => None,
        }
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Final status the agent reported through the status callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportedStatus {
    Done,
    Failed,
    Blocked,
}

impl ReportedStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportedStatus::Done => "done",
            ReportedStatus::Failed => "failed",
            ReportedStatus::Blocked => "blocked",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "done" => Some(ReportedStatus::Done),
            "failed" => Some(ReportedStatus::Failed),
            "blocked" => Some(ReportedStatus::Blocked),
            _ => None,
        }
    }
}

/// Failure taxonomy for failed executions.
///
/// Precedence when signals conflict:
/// output_token_limit > context_exhausted > timeout > error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    Timeout,
    OutputTokenLimit,
    ContextExhausted,
    Hung,
    Error,
}

impl FailureReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureReason::Timeout => "timeout",
            FailureReason::OutputTokenLimit => "output_token_limit",
            FailureReason::ContextExhausted => "context_exhausted",
            FailureReason::Hung => "hung",
            FailureReason::Error => "error",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "timeout" => Some(FailureReason::Timeout),
            "output_token_limit" => Some(FailureReason::OutputTokenLimit),
            "context_exhausted" => Some(FailureReason::ContextExhausted),
            "hung" => Some(FailureReason::Hung),
            "error" => Some(FailureReason::Error),
            _ => None,
        }
    }

    /// A context-exhausted failure is the one the UI offers "resume" for.
    pub fn is_resumable(&self) -> bool {
        matches!(self, FailureReason::ContextExhausted)
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Context-window health counters reported by the agent during a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextHealth {
    #[serde(default)]
    pub compaction_count: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub peak_tokens: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pressure_level: Option<String>,
}

/// One attempt at running a node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeExecution {
    pub id: ExecutionId,
    pub node_id: NodeId,
    pub blueprint_id: BlueprintId,
    /// The agent's own session file id, once detected.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    pub kind: ExecutionKind,
    pub status: ExecutionStatus,
    /// The prompt actually sent to the agent.
    pub input_context: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cli_pid: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_execution_id: Option<ExecutionId>,
    /// Blocker payload from the blocker callback or stdout marker.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blocker_info: Option<serde_json::Value>,
    /// Agent-reported summary from the summary callback.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<FailureReason>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reported_status: Option<ReportedStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reported_reason: Option<String>,
    #[serde(default)]
    pub context_health: ContextHealth,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl NodeExecution {
    /// Elapsed wall-clock minutes, rounded up, against `until` when still open.
    pub fn elapsed_minutes(&self, until: DateTime<Utc>) -> i64 {
        let end = self.completed_at.unwrap_or(until);
        let secs = (end - self.started_at).num_seconds().max(0) as u64;
        secs.div_ceil(60) as i64
    }
}

#[cfg(test)]
#[path = "execution_tests.rs"]
mod tests;
