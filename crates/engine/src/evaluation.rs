// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Evaluation delivery and the graph mutation engine
//!
//! The evaluation callback drops bodies into an in-process inbox; the driver
//! collects them after the subprocess exits (ordering argument: the agent's
//! callback completes before its process can exit, so by the time the driver
//! looks, the body is either there or never coming).

use crate::error::EngineError;
use fm_core::{
    Clock, EvaluationBody, EvaluationStatus, IdGen, MacroNode, MutationAction, NewNodeSpec, NodeId,
    NodeStatus,
};
use fm_storage::{SplitOutcome, Store};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// Last-write-wins mailbox from the evaluation callback to the driver.
#[derive(Clone, Default)]
pub struct EvaluationInbox {
    inner: Arc<Mutex<HashMap<NodeId, EvaluationBody>>>,
}

impl EvaluationInbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, node_id: &NodeId, body: EvaluationBody) {
        self.inner.lock().insert(node_id.clone(), body);
    }

    pub fn take(&self, node_id: &NodeId) -> Option<EvaluationBody> {
        self.inner.lock().remove(node_id)
    }

    pub fn peek(&self, node_id: &NodeId) -> bool {
        self.inner.lock().contains_key(node_id)
    }
}

/// What applying an evaluation did to the graph.
#[derive(Debug, Default)]
pub struct AppliedEvaluation {
    pub status: Option<EvaluationStatus>,
    pub created_nodes: Vec<MacroNode>,
    pub node_updated: bool,
}

/// Apply an evaluation body against the node that produced it.
///
/// `allow_node_update` is set for the reevaluate/enrich flows, where the body
/// may rewrite the node's own fields; run evaluations only mutate the graph
/// around the node.
pub fn apply_evaluation<C: Clock, G: IdGen>(
    store: &Store,
    clock: &C,
    ids: &G,
    node_id: &NodeId,
    body: &EvaluationBody,
    allow_node_update: bool,
) -> Result<AppliedEvaluation, EngineError> {
    let mut applied = AppliedEvaluation {
        status: Some(body.status),
        ..Default::default()
    };

    if allow_node_update {
        if let Some(update) = &body.node_update {
            let node = store.node(node_id)?;
            store.update_node_text(
                node_id,
                update.title.as_deref(),
                update.description.as_deref(),
            )?;
            if let Some(status) = update.status {
                // Never let a callback write executor-owned statuses, and
                // never stomp a node the executor currently owns.
                let executor_owned = matches!(node.status, NodeStatus::Queued | NodeStatus::Running);
                if update.status_is_writable() && !executor_owned {
                    store.set_node_status(node_id, status, None)?;
                } else {
                    tracing::warn!(
                        node_id = %node_id,
                        requested = %status,
                        current = %node.status,
                        "discarding non-writable status from evaluation body"
                    );
                }
            }
            applied.node_updated = true;
        }
    }

    let mut split_specs: Vec<NewNodeSpec> = Vec::new();
    for mutation in body.valid_mutations() {
        match mutation.action {
            MutationAction::InsertBetween => {
                let created = store.apply_insert_between(
                    node_id,
                    &mutation.new_node,
                    NodeId::new(ids.next()),
                    clock.now(),
                )?;
                tracing::info!(
                    node_id = %node_id,
                    new_node = %created.id,
                    title = %created.title,
                    "inserted refinement node"
                );
                applied.created_nodes.push(created);
            }
            MutationAction::AddSibling => {
                let created = store.apply_add_sibling(
                    node_id,
                    &mutation.new_node,
                    NodeId::new(ids.next()),
                    clock.now(),
                )?;
                tracing::info!(
                    node_id = %node_id,
                    new_node = %created.id,
                    title = %created.title,
                    "added blocker sibling"
                );
                applied.created_nodes.push(created);
            }
            MutationAction::Split => split_specs.push(mutation.new_node),
        }
    }

    if !split_specs.is_empty() {
        match split_node(store, clock, ids, node_id, &split_specs) {
            Ok(outcome) => applied.created_nodes.extend(outcome.chain),
            Err(err) => {
                // Split only replaces pending nodes; an evaluation that asks
                // for it on a finished node is dropped, not fatal.
                tracing::warn!(node_id = %node_id, error = %err, "discarding split mutation");
            }
        }
    }

    Ok(applied)
}

/// SPLIT: replace a pending node with a chain of smaller ones.
///
/// Exposed through its own API path rather than the run evaluation flow.
pub fn split_node<C: Clock, G: IdGen>(
    store: &Store,
    clock: &C,
    ids: &G,
    node_id: &NodeId,
    specs: &[NewNodeSpec],
) -> Result<SplitOutcome, EngineError> {
    if specs.is_empty() {
        return Err(EngineError::InvalidRequest(
            "split requires at least one replacement node".to_string(),
        ));
    }
    let node = store.node(node_id)?;
    if node.status != NodeStatus::Pending {
        return Err(EngineError::InvalidState(format!(
            "only pending nodes can be split; {} is {}",
            node_id, node.status
        )));
    }

    let new_ids: Vec<NodeId> = specs.iter().map(|_| NodeId::new(ids.next())).collect();
    let outcome = store.apply_split(node_id, specs, &new_ids, clock.now())?;
    tracing::info!(
        node_id = %node_id,
        chain_len = outcome.chain.len(),
        "split node into chain"
    );
    Ok(outcome)
}

#[cfg(test)]
#[path = "evaluation_tests.rs"]
mod tests;
