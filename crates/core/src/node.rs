// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Macro-node: one step of a blueprint, executed by one agent run

use crate::blueprint::BlueprintId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

crate::define_id! {
    /// Unique identifier for a macro-node.
    #[derive(Default)]
    pub struct NodeId;
}

/// Status of a macro-node.
///
/// The executor exclusively owns pending|failed → queued → running →
/// {done, failed, blocked}. `skipped` and retry resets are user actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    Pending,
    Queued,
    Running,
    Done,
    Failed,
    Blocked,
    Skipped,
}

impl NodeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeStatus::Pending => "pending",
            NodeStatus::Queued => "queued",
            NodeStatus::Running => "running",
            NodeStatus::Done => "done",
            NodeStatus::Failed => "failed",
            NodeStatus::Blocked => "blocked",
            NodeStatus::Skipped => "skipped",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(NodeStatus::Pending),
            "queued" => Some(NodeStatus::Queued),
            "running" => Some(NodeStatus::Running),
            "done" => Some(NodeStatus::Done),
            "failed" => Some(NodeStatus::Failed),
            "blocked" => Some(NodeStatus::Blocked),
            "skipped" => Some(NodeStatus::Skipped),
            _ => None,
        }
    }

    /// A dependency in this status satisfies the strict (execution-time) check.
    pub fn satisfies_strict(&self) -> bool {
        matches!(self, NodeStatus::Done | NodeStatus::Skipped)
    }

    /// A dependency in this status vetoes lenient (queue-time) admission.
    pub fn blocks_admission(&self) -> bool {
        matches!(self, NodeStatus::Failed | NodeStatus::Blocked)
    }

    /// The executor may flip a node in this status to `queued`.
    pub fn can_enqueue(&self) -> bool {
        matches!(self, NodeStatus::Pending | NodeStatus::Failed)
    }
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One step in a blueprint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MacroNode {
    pub id: NodeId,
    pub blueprint_id: BlueprintId,
    /// Display order within the blueprint.
    pub node_order: i64,
    pub title: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    /// Ids of same-blueprint nodes that must complete first.
    #[serde(default)]
    pub dependencies: Vec<NodeId>,
    pub status: NodeStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Per-node agent-type override (falls back to the blueprint's).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_minutes: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual_minutes: Option<i64>,
    pub created_at: DateTime<Utc>,
}

impl MacroNode {
    /// Whether `other` is listed as a dependency of this node.
    pub fn depends_on(&self, other: &NodeId) -> bool {
        self.dependencies.iter().any(|d| d == other)
    }
}

#[cfg(test)]
#[path = "node_tests.rs"]
mod tests;
