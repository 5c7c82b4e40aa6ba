// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-blueprint serial task queues
//!
//! One FIFO per blueprint id, drained by a lazily-spawned task. Work within a
//! blueprint is strictly serial; blueprints drain concurrently with no global
//! bound. A task failure never breaks the drain loop.

use chrono::{DateTime, Utc};
use fm_core::{BlueprintId, NodeId, NodeStatus};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::oneshot;

/// What kind of work a queued task performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskType {
    Run,
    RunAll,
    Reevaluate,
    Enrich,
    Resume,
}

impl TaskType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskType::Run => "run",
            TaskType::RunAll => "run-all",
            TaskType::Reevaluate => "reevaluate",
            TaskType::Enrich => "enrich",
            TaskType::Resume => "resume",
        }
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Outcome delivered to the enqueue-time completion handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    /// Task ran to completion. Run tasks carry the node's resulting status.
    Completed(Option<NodeStatus>),
    /// Task hit an error; the driver has already persisted it.
    Failed(String),
    /// Removed before starting, or skipped by a batch abort.
    Cancelled,
}

impl TaskOutcome {
    pub fn is_done(&self) -> bool {
        matches!(self, TaskOutcome::Completed(Some(NodeStatus::Done)))
            || matches!(self, TaskOutcome::Completed(None))
    }
}

/// Completion handle returned by [`TaskQueue::enqueue`].
pub type TaskHandle = oneshot::Receiver<TaskOutcome>;

pub type TaskFuture = Pin<Box<dyn Future<Output = TaskOutcome> + Send>>;
pub type TaskFn = Box<dyn FnOnce() -> TaskFuture + Send>;

struct QueuedTask {
    task_type: TaskType,
    node_id: Option<NodeId>,
    queued_at: DateTime<Utc>,
    task: TaskFn,
    done_tx: oneshot::Sender<TaskOutcome>,
}

#[derive(Default)]
struct BlueprintFifo {
    draining: bool,
    tasks: VecDeque<QueuedTask>,
}

/// Snapshot of one blueprint's queue.
#[derive(Debug, Clone, Serialize)]
pub struct QueueInfo {
    pub running: bool,
    pub depth: usize,
    pub pending_tasks: Vec<QueueEntry>,
}

/// One visible queue entry.
#[derive(Debug, Clone, Serialize)]
pub struct QueueEntry {
    pub blueprint_id: BlueprintId,
    pub task_type: TaskType,
    pub node_id: Option<NodeId>,
    pub queued_at: DateTime<Utc>,
}

/// The process-wide queue map. Cheap to clone.
#[derive(Clone, Default)]
pub struct TaskQueue {
    inner: Arc<Mutex<HashMap<BlueprintId, BlueprintFifo>>>,
}

impl TaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a task to the blueprint's FIFO, creating it if absent, and kick
    /// a drainer if none is running. Returns the completion handle.
    ///
    /// `queued_at` comes from the caller's clock so queue and registry
    /// listings order against the same time source.
    pub fn enqueue(
        &self,
        blueprint_id: &BlueprintId,
        task_type: TaskType,
        node_id: Option<NodeId>,
        queued_at: DateTime<Utc>,
        task: TaskFn,
    ) -> TaskHandle {
        let (done_tx, done_rx) = oneshot::channel();
        let spawn_drainer = {
            let mut map = self.inner.lock();
            let fifo = map.entry(blueprint_id.clone()).or_default();
            fifo.tasks.push_back(QueuedTask {
                task_type,
                node_id,
                queued_at,
                task,
                done_tx,
            });
            if fifo.draining {
                false
            } else {
                fifo.draining = true;
                true
            }
        };

        if spawn_drainer {
            let queue = self.clone();
            let blueprint_id = blueprint_id.clone();
            tokio::spawn(async move {
                queue.drain(blueprint_id).await;
            });
        }

        done_rx
    }

    /// Cancel a not-yet-started task for `node_id`. The completion handle
    /// resolves with [`TaskOutcome::Cancelled`]; no subprocess is spawned.
    pub fn remove_queued(&self, blueprint_id: &BlueprintId, node_id: &NodeId) -> bool {
        let removed = {
            let mut map = self.inner.lock();
            let Some(fifo) = map.get_mut(blueprint_id) else {
                return false;
            };
            let Some(pos) = fifo
                .tasks
                .iter()
                .position(|t| t.node_id.as_ref() == Some(node_id))
            else {
                return false;
            };
            fifo.tasks.remove(pos)
        };

        if let Some(task) = removed {
            let _ = task.done_tx.send(TaskOutcome::Cancelled);
            true
        } else {
            false
        }
    }

    /// Queue snapshot for one blueprint.
    pub fn queue_info(&self, blueprint_id: &BlueprintId) -> QueueInfo {
        let map = self.inner.lock();
        match map.get(blueprint_id) {
            Some(fifo) => QueueInfo {
                running: fifo.draining,
                depth: fifo.tasks.len(),
                pending_tasks: fifo
                    .tasks
                    .iter()
                    .map(|t| QueueEntry {
                        blueprint_id: blueprint_id.clone(),
                        task_type: t.task_type,
                        node_id: t.node_id.clone(),
                        queued_at: t.queued_at,
                    })
                    .collect(),
            },
            None => QueueInfo {
                running: false,
                depth: 0,
                pending_tasks: Vec::new(),
            },
        }
    }

    /// Flat list of queued tasks across every blueprint.
    pub fn global_queue_info(&self) -> Vec<QueueEntry> {
        let map = self.inner.lock();
        let mut entries: Vec<QueueEntry> = map
            .iter()
            .flat_map(|(blueprint_id, fifo)| {
                fifo.tasks.iter().map(|t| QueueEntry {
                    blueprint_id: blueprint_id.clone(),
                    task_type: t.task_type,
                    node_id: t.node_id.clone(),
                    queued_at: t.queued_at,
                })
            })
            .collect();
        entries.sort_by(|a, b| a.queued_at.cmp(&b.queued_at));
        entries
    }

    /// Whether any blueprint is draining or has queued work.
    pub fn is_idle(&self) -> bool {
        self.inner.lock().is_empty()
    }

    async fn drain(&self, blueprint_id: BlueprintId) {
        loop {
            let next = {
                let mut map = self.inner.lock();
                let Some(fifo) = map.get_mut(&blueprint_id) else {
                    return;
                };
                match fifo.tasks.pop_front() {
                    Some(task) => Some(task),
                    None => {
                        // FIFO empty: release the slot entirely
                        map.remove(&blueprint_id);
                        None
                    }
                }
            };

            let Some(queued) = next else {
                return;
            };

            tracing::debug!(
                blueprint_id = %blueprint_id,
                task_type = %queued.task_type,
                node_id = queued.node_id.as_ref().map(|n| n.as_str()),
                "draining task"
            );

            let outcome = (queued.task)().await;

            if let TaskOutcome::Failed(ref message) = outcome {
                tracing::warn!(
                    blueprint_id = %blueprint_id,
                    task_type = %queued.task_type,
                    error = %message,
                    "queued task failed; drain continues"
                );
            }

            let _ = queued.done_tx.send(outcome);
        }
    }
}

#[cfg(test)]
#[path = "queue_tests.rs"]
mod tests;
