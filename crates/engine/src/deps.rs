// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Dependency resolution: lenient admission vs strict execution

use fm_core::{MacroNode, NodeId, NodeStatus};
use std::collections::HashMap;
use std::fmt;

/// Why a dependency check rejected a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DependencyIssue {
    Missing { dependency: NodeId },
    BadStatus { dependency: NodeId, title: String, status: NodeStatus },
}

impl fmt::Display for DependencyIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DependencyIssue::Missing { dependency } => {
                write!(f, "dependency {} does not exist", dependency)
            }
            DependencyIssue::BadStatus {
                title, status, ..
            } => write!(f, "dependency '{}' is {}", title, status),
        }
    }
}

/// Index a blueprint's nodes by id for dependency lookups.
pub fn index_nodes(nodes: &[MacroNode]) -> HashMap<&NodeId, &MacroNode> {
    nodes.iter().map(|n| (&n.id, n)).collect()
}

/// Lenient (queue-time) check: admissible iff no dependency is failed or
/// blocked. Running, queued, pending, done and skipped all permit admission.
pub fn check_admissible(
    node: &MacroNode,
    by_id: &HashMap<&NodeId, &MacroNode>,
) -> Result<(), DependencyIssue> {
    for dep_id in &node.dependencies {
        let Some(dep) = by_id.get(dep_id) else {
            return Err(DependencyIssue::Missing {
                dependency: dep_id.clone(),
            });
        };
        if dep.status.blocks_admission() {
            return Err(DependencyIssue::BadStatus {
                dependency: dep.id.clone(),
                title: dep.title.clone(),
                status: dep.status,
            });
        }
    }
    Ok(())
}

/// Strict (execution-time) check: executable iff every dependency is done or
/// skipped.
pub fn check_executable(
    node: &MacroNode,
    by_id: &HashMap<&NodeId, &MacroNode>,
) -> Result<(), DependencyIssue> {
    for dep_id in &node.dependencies {
        let Some(dep) = by_id.get(dep_id) else {
            return Err(DependencyIssue::Missing {
                dependency: dep_id.clone(),
            });
        };
        if !dep.status.satisfies_strict() {
            return Err(DependencyIssue::BadStatus {
                dependency: dep.id.clone(),
                title: dep.title.clone(),
                status: dep.status,
            });
        }
    }
    Ok(())
}

/// Topological order over `candidates`, dependencies first.
///
/// Edges outside the candidate set are ignored (their readiness is checked
/// separately). Ties break by `node_order`, then id, so batches are
/// deterministic.
pub fn topological_order(candidates: &[MacroNode]) -> Vec<NodeId> {
    let in_set: HashMap<&NodeId, &MacroNode> = index_nodes(candidates);
    let mut remaining: Vec<&MacroNode> = candidates.iter().collect();
    remaining.sort_by(|a, b| a.node_order.cmp(&b.node_order).then(a.id.cmp(&b.id)));

    let mut placed: Vec<NodeId> = Vec::with_capacity(candidates.len());
    let mut placed_set: std::collections::HashSet<&NodeId> = std::collections::HashSet::new();

    while placed.len() < candidates.len() {
        let mut advanced = false;
        for node in &remaining {
            if placed_set.contains(&node.id) {
                continue;
            }
            let ready = node.dependencies.iter().all(|dep| {
                !in_set.contains_key(dep) || placed_set.contains(dep)
            });
            if ready {
                placed.push(node.id.clone());
                // Safe: node borrows from candidates, same lifetime as in_set keys
                if let Some((key, _)) = in_set.get_key_value(&node.id) {
                    placed_set.insert(key);
                }
                advanced = true;
            }
        }
        if !advanced {
            // Cycle among candidates: append the rest in display order so the
            // strict execution check reports the problem instead of spinning
            for node in &remaining {
                if !placed_set.contains(&node.id) {
                    placed.push(node.id.clone());
                }
            }
            break;
        }
    }

    placed
}

#[cfg(test)]
#[path = "deps_tests.rs"]
mod tests;
