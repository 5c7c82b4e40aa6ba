// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Artifacts: textual handoffs between dependent nodes

use crate::blueprint::BlueprintId;
use crate::node::NodeId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

crate::define_id! {
    /// Unique identifier for an artifact.
    #[derive(Default)]
    pub struct ArtifactId;
}

/// Kind of artifact a completed node produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    HandoffSummary,
    FileDiff,
    TestReport,
    Custom,
}

impl ArtifactKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactKind::HandoffSummary => "handoff_summary",
            ArtifactKind::FileDiff => "file_diff",
            ArtifactKind::TestReport => "test_report",
            ArtifactKind::Custom => "custom",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "handoff_summary" => Some(ArtifactKind::HandoffSummary),
            "file_diff" => Some(ArtifactKind::FileDiff),
            "test_report" => Some(ArtifactKind::TestReport),
            "custom" => Some(ArtifactKind::Custom),
            _ => None,
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A textual handoff produced by a completed node.
///
/// Targeted artifacts carry a `target_node_id`; untargeted ones are adopted
/// on demand by later dependents (latest untargeted per source wins).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artifact {
    pub id: ArtifactId,
    pub blueprint_id: BlueprintId,
    pub source_node_id: NodeId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_node_id: Option<NodeId>,
    pub kind: ArtifactKind,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl Artifact {
    pub fn is_targeted(&self) -> bool {
        self.target_node_id.is_some()
    }
}
