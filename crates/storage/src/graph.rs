// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Graph mutation transactions: insert-between, add-sibling, split,
//! dependency rewiring with artifact backfill

use crate::store::{
    blueprint_nodes, handoff_for_inner, insert_artifact, insert_node, lookup_node, update_node_row,
};
use crate::{Store, StoreError};
use chrono::{DateTime, Utc};
use fm_core::{Artifact, ArtifactId, ArtifactKind, MacroNode, NewNodeSpec, NodeId, NodeStatus};
use rusqlite::{params, Connection};

/// Result of a split: the chain replacing the original node, in order.
#[derive(Debug, Clone)]
pub struct SplitOutcome {
    pub chain: Vec<MacroNode>,
}

/// Insert a node at its `node_order`, shifting later siblings down by one.
/// Runs inside the caller's transaction.
fn insert_node_shifting_orders(conn: &Connection, node: &MacroNode) -> Result<(), StoreError> {
    conn.execute(
        "UPDATE macro_nodes SET node_order = node_order + 1
         WHERE blueprint_id = ?1 AND node_order >= ?2",
        params![node.blueprint_id.as_str(), node.node_order],
    )?;
    insert_node(conn, node)?;
    Ok(())
}

impl Store {
    /// INSERT_BETWEEN: slot a refinement node between a just-completed node
    /// and its dependents.
    ///
    /// The new node depends on the completed one; every dependent has the
    /// completed node replaced by the new one, making it the gatekeeper.
    pub fn apply_insert_between(
        &self,
        node_id: &NodeId,
        spec: &NewNodeSpec,
        new_id: NodeId,
        now: DateTime<Utc>,
    ) -> Result<MacroNode, StoreError> {
        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            let source = lookup_node(&tx, node_id)?;

            let refinement = MacroNode {
                id: new_id,
                blueprint_id: source.blueprint_id.clone(),
                node_order: source.node_order + 1,
                title: spec.title.clone(),
                description: spec.description.clone(),
                prompt: None,
                dependencies: vec![source.id.clone()],
                status: NodeStatus::Pending,
                error: None,
                agent_type: None,
                estimated_minutes: None,
                actual_minutes: None,
                created_at: now,
            };

            insert_node_shifting_orders(&tx, &refinement)?;

            for mut dependent in blueprint_nodes(&tx, &source.blueprint_id)? {
                if dependent.id == refinement.id || !dependent.depends_on(&source.id) {
                    continue;
                }
                for dep in dependent.dependencies.iter_mut() {
                    if *dep == source.id {
                        *dep = refinement.id.clone();
                    }
                }
                update_node_row(&tx, &dependent)?;
            }

            tx.commit()?;
            Ok(refinement)
        })
    }

    /// ADD_SIBLING: record an external blocker next to a completed node.
    ///
    /// The blocker node starts `blocked` and is appended to every dependent's
    /// dependencies; dependents stay gated until a user resolves it.
    pub fn apply_add_sibling(
        &self,
        node_id: &NodeId,
        spec: &NewNodeSpec,
        new_id: NodeId,
        now: DateTime<Utc>,
    ) -> Result<MacroNode, StoreError> {
        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            let source = lookup_node(&tx, node_id)?;

            let blocker = MacroNode {
                id: new_id,
                blueprint_id: source.blueprint_id.clone(),
                node_order: source.node_order + 1,
                title: spec.title.clone(),
                description: spec.description.clone(),
                prompt: None,
                dependencies: source.dependencies.clone(),
                status: NodeStatus::Blocked,
                error: None,
                agent_type: None,
                estimated_minutes: None,
                actual_minutes: None,
                created_at: now,
            };

            insert_node_shifting_orders(&tx, &blocker)?;

            for mut dependent in blueprint_nodes(&tx, &source.blueprint_id)? {
                if dependent.id == blocker.id || !dependent.depends_on(&source.id) {
                    continue;
                }
                if !dependent.depends_on(&blocker.id) {
                    dependent.dependencies.push(blocker.id.clone());
                }
                update_node_row(&tx, &dependent)?;
            }

            tx.commit()?;
            Ok(blocker)
        })
    }

    /// SPLIT: replace a pending node by a chain N₁ → … → Nₖ.
    ///
    /// N₁ inherits the original dependencies, each link depends on the
    /// previous one, former dependents re-point at Nₖ, and the original node
    /// is marked skipped.
    pub fn apply_split(
        &self,
        node_id: &NodeId,
        specs: &[NewNodeSpec],
        new_ids: &[NodeId],
        now: DateTime<Utc>,
    ) -> Result<SplitOutcome, StoreError> {
        if specs.is_empty() || specs.len() != new_ids.len() {
            return Err(StoreError::Constraint(
                "split requires one id per replacement node".to_string(),
            ));
        }

        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            let mut original = lookup_node(&tx, node_id)?;

            tx.execute(
                "UPDATE macro_nodes SET node_order = node_order + ?3
                 WHERE blueprint_id = ?1 AND node_order > ?2",
                params![
                    original.blueprint_id.as_str(),
                    original.node_order,
                    specs.len() as i64
                ],
            )?;

            let mut chain = Vec::with_capacity(specs.len());
            for (i, (spec, id)) in specs.iter().zip(new_ids).enumerate() {
                let dependencies = if i == 0 {
                    original.dependencies.clone()
                } else {
                    vec![new_ids[i - 1].clone()]
                };
                let link = MacroNode {
                    id: id.clone(),
                    blueprint_id: original.blueprint_id.clone(),
                    node_order: original.node_order + 1 + i as i64,
                    title: spec.title.clone(),
                    description: spec.description.clone(),
                    prompt: None,
                    dependencies,
                    status: NodeStatus::Pending,
                    error: None,
                    agent_type: original.agent_type.clone(),
                    estimated_minutes: None,
                    actual_minutes: None,
                    created_at: now,
                };
                insert_node(&tx, &link)?;
                chain.push(link);
            }

            let last_id = new_ids[new_ids.len() - 1].clone();
            for mut dependent in blueprint_nodes(&tx, &original.blueprint_id)? {
                if new_ids.contains(&dependent.id)
                    || dependent.id == original.id
                    || !dependent.depends_on(&original.id)
                {
                    continue;
                }
                for dep in dependent.dependencies.iter_mut() {
                    if *dep == original.id {
                        *dep = last_id.clone();
                    }
                }
                update_node_row(&tx, &dependent)?;
            }

            original.status = NodeStatus::Skipped;
            update_node_row(&tx, &original)?;

            tx.commit()?;
            Ok(SplitOutcome { chain })
        })
    }

    /// Rewire a node's dependency set.
    ///
    /// For every newly-added dependency whose source has no artifact targeted
    /// at this node yet, a targeted handoff is backfilled from the source's
    /// latest untargeted artifact. `make_id` supplies artifact ids.
    pub fn set_node_dependencies(
        &self,
        node_id: &NodeId,
        dependencies: &[NodeId],
        now: DateTime<Utc>,
        mut make_id: impl FnMut() -> String,
    ) -> Result<(), StoreError> {
        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            let mut node = lookup_node(&tx, node_id)?;

            for dep in dependencies {
                let dep_node = lookup_node(&tx, dep)?;
                if dep_node.blueprint_id != node.blueprint_id {
                    return Err(StoreError::Constraint(format!(
                        "dependency {} belongs to another blueprint",
                        dep
                    )));
                }
            }

            let added: Vec<NodeId> = dependencies
                .iter()
                .filter(|d| !node.depends_on(d))
                .cloned()
                .collect();

            node.dependencies = dependencies.to_vec();
            update_node_row(&tx, &node)?;

            for dep in added {
                let existing = handoff_for_inner(&tx, &dep, &node.id)?;
                match existing {
                    Some(artifact) if artifact.is_targeted() => {}
                    Some(untargeted) => {
                        let backfill = Artifact {
                            id: ArtifactId::new(make_id()),
                            blueprint_id: node.blueprint_id.clone(),
                            source_node_id: dep.clone(),
                            target_node_id: Some(node.id.clone()),
                            kind: ArtifactKind::HandoffSummary,
                            content: untargeted.content,
                            created_at: now,
                        };
                        insert_artifact(&tx, &backfill)?;
                    }
                    None => {}
                }
            }

            tx.commit()?;
            Ok(())
        })
    }
}

#[cfg(test)]
#[path = "graph_tests.rs"]
mod tests;
