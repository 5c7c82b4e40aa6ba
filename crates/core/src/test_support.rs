// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared test builders for use across crates.
//!
//! Gated behind `#[cfg(any(test, feature = "test-support"))]`.

use crate::{
    Blueprint, BlueprintId, BlueprintStatus, ExecutionId, ExecutionKind, ExecutionStatus,
    MacroNode, NodeExecution, NodeId, NodeStatus,
};
use chrono::{DateTime, TimeZone, Utc};
use std::path::PathBuf;

/// Fixed timestamp all builders default to.
pub fn t0() -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000, 0)
        .single()
        .unwrap_or_else(Utc::now)
}

pub fn blueprint(id: &str, title: &str) -> Blueprint {
    Blueprint {
        id: BlueprintId::new(id),
        title: title.to_string(),
        description: None,
        project_dir: Some(PathBuf::from("/test/project")),
        agent_type: None,
        status: BlueprintStatus::Approved,
        created_at: t0(),
    }
}

pub fn node(id: &str, blueprint_id: &str, deps: &[&str]) -> MacroNode {
    MacroNode {
        id: NodeId::new(id),
        blueprint_id: BlueprintId::new(blueprint_id),
        node_order: 0,
        title: format!("node {id}"),
        description: String::new(),
        prompt: None,
        dependencies: deps.iter().map(|d| NodeId::new(*d)).collect(),
        status: NodeStatus::Pending,
        error: None,
        agent_type: None,
        estimated_minutes: None,
        actual_minutes: None,
        created_at: t0(),
    }
}

pub fn node_with_status(
    id: &str,
    blueprint_id: &str,
    deps: &[&str],
    status: NodeStatus,
) -> MacroNode {
    let mut n = node(id, blueprint_id, deps);
    n.status = status;
    n
}

pub fn execution(
    id: &str,
    node_id: &str,
    blueprint_id: &str,
    started_at: DateTime<Utc>,
) -> NodeExecution {
    NodeExecution {
        id: ExecutionId::new(id),
        node_id: NodeId::new(node_id),
        blueprint_id: BlueprintId::new(blueprint_id),
        session_id: None,
        kind: ExecutionKind::Primary,
        status: ExecutionStatus::Running,
        input_context: String::new(),
        output_summary: None,
        cli_pid: None,
        parent_execution_id: None,
        blocker_info: None,
        task_summary: None,
        failure_reason: None,
        reported_status: None,
        reported_reason: None,
        context_health: Default::default(),
        started_at,
        completed_at: None,
    }
}
