// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Related sessions: non-primary agent sessions surfaced to the UI

use crate::blueprint::BlueprintId;
use crate::node::NodeId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What a non-primary agent session was started for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelatedSessionKind {
    Enrich,
    Reevaluate,
    Split,
    Evaluate,
    Generate,
}

impl RelatedSessionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelatedSessionKind::Enrich => "enrich",
            RelatedSessionKind::Reevaluate => "reevaluate",
            RelatedSessionKind::Split => "split",
            RelatedSessionKind::Evaluate => "evaluate",
            RelatedSessionKind::Generate => "generate",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "enrich" => Some(RelatedSessionKind::Enrich),
            "reevaluate" => Some(RelatedSessionKind::Reevaluate),
            "split" => Some(RelatedSessionKind::Split),
            "evaluate" => Some(RelatedSessionKind::Evaluate),
            "generate" => Some(RelatedSessionKind::Generate),
            _ => None,
        }
    }
}

/// Denormalized link from a helper agent session to a node.
///
/// Display-only; never consulted for control flow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelatedSession {
    pub id: String,
    pub blueprint_id: BlueprintId,
    pub node_id: NodeId,
    pub session_id: String,
    pub kind: RelatedSessionKind,
    pub created_at: DateTime<Utc>,
}
