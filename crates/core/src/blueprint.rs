// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Blueprint: a DAG of coding tasks for one project

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

crate::define_id! {
    /// Unique identifier for a blueprint.
    #[derive(Default)]
    pub struct BlueprintId;
}

/// Lifecycle status of a blueprint.
///
/// The executor only transitions approved ↔ running → done; `failed` and
/// `paused` are user-set, `draft` exists before approval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlueprintStatus {
    Draft,
    Approved,
    Running,
    Paused,
    Done,
    Failed,
}

impl BlueprintStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BlueprintStatus::Draft => "draft",
            BlueprintStatus::Approved => "approved",
            BlueprintStatus::Running => "running",
            BlueprintStatus::Paused => "paused",
            BlueprintStatus::Done => "done",
            BlueprintStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "draft" => Some(BlueprintStatus::Draft),
            "approved" => Some(BlueprintStatus::Approved),
            "running" => Some(BlueprintStatus::Running),
            "paused" => Some(BlueprintStatus::Paused),
            "done" => Some(BlueprintStatus::Done),
            "failed" => Some(BlueprintStatus::Failed),
            _ => None,
        }
    }
}

impl fmt::Display for BlueprintStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A plan: owns a set of macro-nodes executed against one project directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Blueprint {
    pub id: BlueprintId,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Working directory agents run in; nodes without it cannot execute.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_dir: Option<PathBuf>,
    /// Agent-type override for every node in this blueprint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_type: Option<String>,
    pub status: BlueprintStatus,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
#[path = "blueprint_tests.rs"]
mod tests;
