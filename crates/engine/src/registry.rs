// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pending-task registry
//!
//! In-memory catalog of queued tasks per blueprint, surfaced to the UI and
//! used for "is anything active?" checks. Updated in lockstep with the task
//! queue by the driver.

use crate::queue::TaskType;
use chrono::{DateTime, Utc};
use fm_core::{BlueprintId, NodeId};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

/// One catalogued task.
#[derive(Debug, Clone, Serialize)]
pub struct PendingTask {
    pub task_type: TaskType,
    pub node_id: Option<NodeId>,
    pub queued_at: DateTime<Utc>,
}

/// blueprint id → ordered pending tasks. Cheap to clone.
#[derive(Clone, Default)]
pub struct PendingTaskRegistry {
    inner: Arc<Mutex<HashMap<BlueprintId, Vec<PendingTask>>>>,
}

impl PendingTaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(
        &self,
        blueprint_id: &BlueprintId,
        task_type: TaskType,
        node_id: Option<NodeId>,
        queued_at: DateTime<Utc>,
    ) {
        let mut map = self.inner.lock();
        map.entry(blueprint_id.clone()).or_default().push(PendingTask {
            task_type,
            node_id,
            queued_at,
        });
    }

    /// Remove the first task matching `(blueprint_id, node_id?, task_type?)`;
    /// `None` matches anything. Removing the last entry deletes the key.
    /// Idempotent: removing a non-existent task is a no-op.
    pub fn remove(
        &self,
        blueprint_id: &BlueprintId,
        node_id: Option<&NodeId>,
        task_type: Option<TaskType>,
    ) -> bool {
        let mut map = self.inner.lock();
        let Some(tasks) = map.get_mut(blueprint_id) else {
            return false;
        };
        let Some(pos) = tasks.iter().position(|t| {
            node_id.is_none_or(|n| t.node_id.as_ref() == Some(n))
                && task_type.is_none_or(|ty| t.task_type == ty)
        }) else {
            return false;
        };
        tasks.remove(pos);
        if tasks.is_empty() {
            map.remove(blueprint_id);
        }
        true
    }

    /// Whether a task for `(blueprint_id, node_id, task_type)` is catalogued.
    pub fn contains(
        &self,
        blueprint_id: &BlueprintId,
        node_id: Option<&NodeId>,
        task_type: Option<TaskType>,
    ) -> bool {
        let map = self.inner.lock();
        map.get(blueprint_id).is_some_and(|tasks| {
            tasks.iter().any(|t| {
                node_id.is_none_or(|n| t.node_id.as_ref() == Some(n))
                    && task_type.is_none_or(|ty| t.task_type == ty)
            })
        })
    }

    pub fn list(&self, blueprint_id: &BlueprintId) -> Vec<PendingTask> {
        self.inner
            .lock()
            .get(blueprint_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn list_all(&self) -> Vec<(BlueprintId, PendingTask)> {
        let map = self.inner.lock();
        let mut all: Vec<(BlueprintId, PendingTask)> = map
            .iter()
            .flat_map(|(id, tasks)| tasks.iter().map(|t| (id.clone(), t.clone())))
            .collect();
        all.sort_by(|a, b| a.1.queued_at.cmp(&b.1.queued_at));
        all
    }

    /// Whether anything is queued or running for this blueprint.
    pub fn has_any(&self, blueprint_id: &BlueprintId) -> bool {
        self.inner.lock().contains_key(blueprint_id)
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
