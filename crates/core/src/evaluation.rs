// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent self-evaluation bodies and graph mutations

use crate::node::NodeStatus;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Verdict the agent declares after finishing (or inspecting) a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EvaluationStatus {
    #[serde(rename = "COMPLETE")]
    Complete,
    #[serde(rename = "NEEDS_REFINEMENT")]
    NeedsRefinement,
    #[serde(rename = "HAS_BLOCKER")]
    HasBlocker,
}

impl EvaluationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EvaluationStatus::Complete => "COMPLETE",
            EvaluationStatus::NeedsRefinement => "NEEDS_REFINEMENT",
            EvaluationStatus::HasBlocker => "HAS_BLOCKER",
        }
    }
}

impl fmt::Display for EvaluationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Graph mutation operators the evaluation engine applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MutationAction {
    InsertBetween,
    AddSibling,
    Split,
}

impl MutationAction {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "INSERT_BETWEEN" => Some(MutationAction::InsertBetween),
            "ADD_SIBLING" => Some(MutationAction::AddSibling),
            "SPLIT" => Some(MutationAction::Split),
            _ => None,
        }
    }
}

/// Title/description of a node a mutation wants created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewNodeSpec {
    pub title: String,
    #[serde(default)]
    pub description: String,
}

/// A validated mutation request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeMutation {
    pub action: MutationAction,
    pub new_node: NewNodeSpec,
}

/// Raw mutation as it arrives on the wire. Individually malformed entries
/// (unknown action, missing title) are discarded rather than rejecting the
/// whole body.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawMutation {
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub new_node: Option<RawNewNode>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawNewNode {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

/// In-place node field update carried by a reevaluation body.
///
/// `status` writes are restricted to user-writable values; the executor-owned
/// `queued` column is never accepted here.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct NodeUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<NodeStatus>,
}

impl NodeUpdate {
    /// Whether the carried status is one an external actor may write.
    pub fn status_is_writable(&self) -> bool {
        !matches!(
            self.status,
            Some(NodeStatus::Queued) | Some(NodeStatus::Running)
        )
    }
}

/// Body of the evaluation callback: `{status, evaluation, mutations[]}`.
///
/// Deserialization rejects unknown `status` values outright; mutations are
/// sanitized individually via [`EvaluationBody::valid_mutations`].
#[derive(Debug, Clone, Deserialize)]
pub struct EvaluationBody {
    pub status: EvaluationStatus,
    #[serde(default)]
    pub evaluation: String,
    #[serde(default)]
    pub mutations: Vec<RawMutation>,
    #[serde(default)]
    pub node_update: Option<NodeUpdate>,
}

impl EvaluationBody {
    /// Filter raw mutations down to well-formed ones.
    ///
    /// A mutation survives iff its action parses and its new node carries a
    /// non-empty title.
    pub fn valid_mutations(&self) -> Vec<NodeMutation> {
        self.mutations
            .iter()
            .filter_map(|raw| {
                let action = MutationAction::parse(raw.action.as_deref()?)?;
                let new_node = raw.new_node.as_ref()?;
                let title = new_node.title.clone().filter(|t| !t.trim().is_empty())?;
                Some(NodeMutation {
                    action,
                    new_node: NewNodeSpec {
                        title,
                        description: new_node.description.clone().unwrap_or_default(),
                    },
                })
            })
            .collect()
    }

    /// A COMPLETE evaluation with no surviving mutations.
    pub fn complete() -> Self {
        Self {
            status: EvaluationStatus::Complete,
            evaluation: String::new(),
            mutations: Vec::new(),
            node_update: None,
        }
    }
}

#[cfg(test)]
#[path = "evaluation_tests.rs"]
mod tests;
