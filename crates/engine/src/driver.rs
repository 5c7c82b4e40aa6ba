// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The execution driver
//!
//! Owns every node status transition in the executor's charge: admission,
//! queueing, the run itself, outcome classification, artifact fan-out, and
//! scheduling of downstream work. Failures inside a queued task are persisted
//! and never escape the drain loop.

use crate::config::EngineConfig;
use crate::deps::{check_executable, index_nodes, topological_order};
use crate::error::EngineError;
use crate::evaluation::{apply_evaluation, EvaluationInbox};
use crate::outcome::{classify, RunVerdict};
use crate::prompt::{
    build_enrich_prompt, build_reevaluate_prompt, build_resume_prompt, build_run_prompt,
    DependencyHandoff, RunPromptArgs,
};
use crate::queue::{TaskHandle, TaskOutcome, TaskQueue, TaskType};
use crate::registry::PendingTaskRegistry;
use fm_adapters::{AgentRegistry, AgentRunOutput, AgentRunRequest};
use fm_core::{
    Artifact, ArtifactId, ArtifactKind, Blueprint, BlueprintId, BlueprintStatus, Clock,
    EvaluationBody, ExecutionId, ExecutionKind, ExecutionStatus, FailureReason, IdGen, MacroNode,
    NodeExecution, NodeId, NodeStatus, RelatedSession, RelatedSessionKind,
};
use fm_storage::{ExecutionFinish, Store};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::oneshot;

/// Shared state of one run-all batch: which pre-queued nodes remain, and
/// whether a failure aborted the rest.
pub struct RunAllBatch {
    blueprint_id: BlueprintId,
    state: Mutex<BatchState>,
}

struct BatchState {
    aborted: bool,
    remaining: HashSet<NodeId>,
}

impl RunAllBatch {
    pub fn new(blueprint_id: BlueprintId, members: impl IntoIterator<Item = NodeId>) -> Arc<Self> {
        Arc::new(Self {
            blueprint_id,
            state: Mutex::new(BatchState {
                aborted: false,
                remaining: members.into_iter().collect(),
            }),
        })
    }

    fn is_aborted(&self) -> bool {
        self.state.lock().aborted
    }

    fn finish_member(&self, node_id: &NodeId) {
        self.state.lock().remaining.remove(node_id);
    }

    fn abort(&self) -> Vec<NodeId> {
        let mut state = self.state.lock();
        state.aborted = true;
        state.remaining.drain().collect()
    }

    fn admit(&self, node_id: NodeId) {
        self.state.lock().remaining.insert(node_id);
    }
}

/// The plan executor's driver. Cheap to clone; clones share all state.
#[derive(Clone)]
pub struct ExecutionDriver<C: Clock, G: IdGen> {
    store: Store,
    agents: AgentRegistry,
    queue: TaskQueue,
    pending: PendingTaskRegistry,
    inbox: EvaluationInbox,
    clock: C,
    ids: G,
    config: Arc<EngineConfig>,
}

impl<C: Clock, G: IdGen + 'static> ExecutionDriver<C, G> {
    pub fn new(store: Store, agents: AgentRegistry, clock: C, ids: G, config: EngineConfig) -> Self {
        Self {
            store,
            agents,
            queue: TaskQueue::new(),
            pending: PendingTaskRegistry::new(),
            inbox: EvaluationInbox::new(),
            clock,
            ids,
            config: Arc::new(config),
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn queue(&self) -> &TaskQueue {
        &self.queue
    }

    pub fn pending(&self) -> &PendingTaskRegistry {
        &self.pending
    }

    pub fn inbox(&self) -> &EvaluationInbox {
        &self.inbox
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn agents(&self) -> &AgentRegistry {
        &self.agents
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    // ── Task entry points ───────────────────────────────────────────────────

    /// Admit and enqueue a single `run` task.
    ///
    /// Strict dependency check at admission: the caller sees the rejection
    /// message directly instead of a failed task.
    pub fn run_node(&self, node_id: &NodeId) -> Result<TaskHandle, EngineError> {
        let node = self.store.node(node_id)?;
        let nodes = self.store.nodes_for_blueprint(&node.blueprint_id)?;
        check_executable(&node, &index_nodes(&nodes))
            .map_err(|issue| EngineError::DependencyUnmet(issue.to_string()))?;

        self.mark_queued(&node)?;
        self.pending.add(
            &node.blueprint_id,
            TaskType::Run,
            Some(node_id.clone()),
            self.clock.now(),
        );
        Ok(self.enqueue_run(&node.blueprint_id, node_id.clone(), None, None, TaskType::Run))
    }

    /// Pre-queue every currently-admissible pending node and run them in
    /// topological order; any failure resets the not-yet-run remainder.
    pub fn run_all(&self, blueprint_id: &BlueprintId) -> Result<Vec<(NodeId, TaskHandle)>, EngineError> {
        let nodes = self.store.nodes_for_blueprint(blueprint_id)?;

        let members: Vec<MacroNode> = nodes
            .iter()
            .filter(|n| n.status == NodeStatus::Pending)
            .filter(|n| {
                n.dependencies.iter().all(|dep_id| {
                    nodes.iter().any(|m| {
                        &m.id == dep_id
                            && matches!(
                                m.status,
                                NodeStatus::Done
                                    | NodeStatus::Skipped
                                    | NodeStatus::Pending
                                    | NodeStatus::Queued
                            )
                    })
                })
            })
            .cloned()
            .collect();

        if members.is_empty() {
            return Ok(Vec::new());
        }

        let member_ids: Vec<NodeId> = members.iter().map(|n| n.id.clone()).collect();
        self.store.set_nodes_status(&member_ids, NodeStatus::Queued)?;

        let batch = RunAllBatch::new(blueprint_id.clone(), member_ids.clone());
        let ordered = topological_order(&members);

        tracing::info!(
            blueprint_id = %blueprint_id,
            count = ordered.len(),
            "run-all pre-queued batch"
        );

        let mut handles = Vec::with_capacity(ordered.len());
        for node_id in ordered {
            self.pending.add(
                blueprint_id,
                TaskType::Run,
                Some(node_id.clone()),
                self.clock.now(),
            );
            let handle = self.enqueue_run(
                blueprint_id,
                node_id.clone(),
                None,
                Some(batch.clone()),
                TaskType::Run,
            );
            handles.push((node_id, handle));
        }
        Ok(handles)
    }

    /// Ask the agent to re-derive a node's fields from the project source.
    pub fn reevaluate_node(&self, node_id: &NodeId) -> Result<TaskHandle, EngineError> {
        let node = self.store.node(node_id)?;
        self.pending.add(
            &node.blueprint_id,
            TaskType::Reevaluate,
            Some(node_id.clone()),
            self.clock.now(),
        );
        let driver = self.clone();
        let id = node_id.clone();
        Ok(self.queue.enqueue(
            &node.blueprint_id,
            TaskType::Reevaluate,
            Some(node_id.clone()),
            self.clock.now(),
            Box::new(move || Box::pin(async move { driver.execute_helper(id, TaskType::Reevaluate).await })),
        ))
    }

    /// Optional title/description rewrite; never touches node status.
    pub fn enrich_node(&self, node_id: &NodeId) -> Result<TaskHandle, EngineError> {
        let node = self.store.node(node_id)?;
        self.pending.add(
            &node.blueprint_id,
            TaskType::Enrich,
            Some(node_id.clone()),
            self.clock.now(),
        );
        let driver = self.clone();
        let id = node_id.clone();
        Ok(self.queue.enqueue(
            &node.blueprint_id,
            TaskType::Enrich,
            Some(node_id.clone()),
            self.clock.now(),
            Box::new(move || Box::pin(async move { driver.execute_helper(id, TaskType::Enrich).await })),
        ))
    }

    /// Resume a failed execution's agent session from where it stopped.
    pub fn resume_execution(&self, execution_id: &ExecutionId) -> Result<TaskHandle, EngineError> {
        let parent = self.store.execution(execution_id)?;
        if parent.status != ExecutionStatus::Failed {
            return Err(EngineError::InvalidRequest(format!(
                "execution {} is {}, only failed executions can be resumed",
                execution_id, parent.status
            )));
        }
        if parent.session_id.is_none() {
            return Err(EngineError::InvalidRequest(format!(
                "execution {} has no session to resume",
                execution_id
            )));
        }

        let node = self.store.node(&parent.node_id)?;
        let nodes = self.store.nodes_for_blueprint(&node.blueprint_id)?;
        check_executable(&node, &index_nodes(&nodes))
            .map_err(|issue| EngineError::DependencyUnmet(issue.to_string()))?;

        self.mark_queued(&node)?;
        self.pending.add(
            &node.blueprint_id,
            TaskType::Resume,
            Some(node.id.clone()),
            self.clock.now(),
        );
        Ok(self.enqueue_run(
            &node.blueprint_id,
            node.id.clone(),
            Some(parent),
            None,
            TaskType::Resume,
        ))
    }

    /// SPLIT through its own API path: replace a pending node with a chain.
    pub fn split_node(
        &self,
        node_id: &NodeId,
        specs: &[fm_core::NewNodeSpec],
    ) -> Result<fm_storage::SplitOutcome, EngineError> {
        crate::evaluation::split_node(&self.store, &self.clock, &self.ids, node_id, specs)
    }

    /// Cancel a not-yet-started task and reset the node to pending.
    pub fn cancel_queued(&self, blueprint_id: &BlueprintId, node_id: &NodeId) -> Result<bool, EngineError> {
        if !self.queue.remove_queued(blueprint_id, node_id) {
            return Ok(false);
        }
        self.pending.remove(blueprint_id, Some(node_id), None);
        self.store
            .set_node_status_if(node_id, NodeStatus::Queued, NodeStatus::Pending)?;
        Ok(true)
    }

    /// Re-enqueue an orphaned queued node during recovery.
    ///
    /// Deduplicates against the pending registry so running recovery twice is
    /// a no-op; the batch gives orphans run-all abort semantics.
    pub fn enqueue_orphan(&self, node: &MacroNode, batch: &Arc<RunAllBatch>) -> Option<TaskHandle> {
        if self
            .pending
            .contains(&node.blueprint_id, Some(&node.id), Some(TaskType::Run))
        {
            return None;
        }
        batch.admit(node.id.clone());
        self.pending.add(
            &node.blueprint_id,
            TaskType::Run,
            Some(node.id.clone()),
            self.clock.now(),
        );
        Some(self.enqueue_run(
            &node.blueprint_id,
            node.id.clone(),
            None,
            Some(batch.clone()),
            TaskType::Run,
        ))
    }

    // ── Run execution ───────────────────────────────────────────────────────

    fn mark_queued(&self, node: &MacroNode) -> Result<(), EngineError> {
        if node.status.can_enqueue() {
            self.store
                .set_node_status(&node.id, NodeStatus::Queued, None)?;
            Ok(())
        } else if node.status == NodeStatus::Queued {
            Ok(())
        } else {
            Err(EngineError::InvalidState(format!(
                "node {} is {}, expected pending, failed or queued",
                node.id, node.status
            )))
        }
    }

    fn enqueue_run(
        &self,
        blueprint_id: &BlueprintId,
        node_id: NodeId,
        parent: Option<NodeExecution>,
        batch: Option<Arc<RunAllBatch>>,
        task_type: TaskType,
    ) -> TaskHandle {
        let driver = self.clone();
        self.queue.enqueue(
            blueprint_id,
            task_type,
            Some(node_id.clone()),
            self.clock.now(),
            Box::new(move || {
                Box::pin(async move { driver.execute_run(node_id, parent, batch, task_type).await })
            }),
        )
    }

    async fn execute_run(
        &self,
        node_id: NodeId,
        parent: Option<NodeExecution>,
        batch: Option<Arc<RunAllBatch>>,
        task_type: TaskType,
    ) -> TaskOutcome {
        let blueprint_id = match self.store.node(&node_id) {
            Ok(node) => node.blueprint_id.clone(),
            Err(err) => {
                tracing::error!(node_id = %node_id, error = %err, "node vanished before execution");
                return TaskOutcome::Failed(err.to_string());
            }
        };

        // Batch aborted while this task sat in the FIFO: its node was already
        // reset to pending, nothing to do.
        if batch.as_ref().is_some_and(|b| b.is_aborted()) {
            self.pending
                .remove(&blueprint_id, Some(&node_id), Some(task_type));
            return TaskOutcome::Cancelled;
        }

        let outcome = match self.run_to_completion(&node_id, parent).await {
            Ok(outcome) => outcome,
            Err(err) => {
                tracing::error!(node_id = %node_id, error = %err, "run task failed outside classification");
                self.persist_unexpected_failure(&node_id, &err);
                TaskOutcome::Failed(err.to_string())
            }
        };

        self.pending
            .remove(&blueprint_id, Some(&node_id), Some(task_type));

        if let Some(batch) = &batch {
            self.handle_batch_progress(batch, &node_id, &outcome);
        }
        if let Err(err) = self.refresh_blueprint_status(&blueprint_id) {
            tracing::warn!(blueprint_id = %blueprint_id, error = %err, "blueprint status refresh failed");
        }

        outcome
    }

    /// A store failure outside the classification path: fail the node if it
    /// reached `running`, otherwise release it back to `pending`.
    fn persist_unexpected_failure(&self, node_id: &NodeId, err: &EngineError) {
        let reverted = self
            .store
            .set_node_status_if(node_id, NodeStatus::Queued, NodeStatus::Pending)
            .unwrap_or(false);
        if !reverted {
            let message = format!("{}: {}", FailureReason::Error, err);
            if let Err(write_err) =
                self.store
                    .set_node_status(node_id, NodeStatus::Failed, Some(&message))
            {
                tracing::error!(node_id = %node_id, error = %write_err, "failed to persist node failure");
            }
        }
    }

    async fn run_to_completion(
        &self,
        node_id: &NodeId,
        parent: Option<NodeExecution>,
    ) -> Result<TaskOutcome, EngineError> {
        // Fresh reads immediately before the decision
        let node = self.store.node(node_id)?;
        let blueprint = self.store.blueprint(&node.blueprint_id)?;
        let nodes = self.store.nodes_for_blueprint(&node.blueprint_id)?;

        if let Err(issue) = check_executable(&node, &index_nodes(&nodes)) {
            let message = format!("{}: dependency regressed ({})", FailureReason::Error, issue);
            self.store
                .set_node_status(&node.id, NodeStatus::Failed, Some(&message))?;
            return Ok(TaskOutcome::Failed(message));
        }

        let Some(project_dir) = blueprint.project_dir.clone() else {
            let message = format!(
                "{}: blueprint has no project directory",
                FailureReason::Error
            );
            self.store
                .set_node_status(&node.id, NodeStatus::Failed, Some(&message))?;
            return Ok(TaskOutcome::Failed(message));
        };

        let prompt = self.assemble_prompt(&blueprint, &node, &nodes, parent.is_some())?;

        if blueprint.status == BlueprintStatus::Approved {
            self.store
                .set_blueprint_status(&blueprint.id, BlueprintStatus::Running)?;
        }
        self.store
            .set_node_status(&node.id, NodeStatus::Running, None)?;

        let execution = NodeExecution {
            id: ExecutionId::new(self.ids.next()),
            node_id: node.id.clone(),
            blueprint_id: blueprint.id.clone(),
            session_id: None,
            kind: if parent.is_some() {
                ExecutionKind::Retry
            } else {
                ExecutionKind::Primary
            },
            status: ExecutionStatus::Running,
            input_context: prompt.clone(),
            output_summary: None,
            cli_pid: None,
            parent_execution_id: parent.as_ref().map(|p| p.id.clone()),
            blocker_info: None,
            task_summary: None,
            failure_reason: None,
            reported_status: None,
            reported_reason: None,
            context_health: Default::default(),
            started_at: self.clock.now(),
            completed_at: None,
        };
        self.store.create_execution(&execution)?;

        tracing::info!(
            node_id = %node.id,
            execution_id = %execution.id,
            kind = execution.kind.as_str(),
            "starting agent run"
        );

        let adapter = self
            .agents
            .resolve(node.agent_type.as_deref().or(blueprint.agent_type.as_deref()))?;

        // Record the CLI pid on the row as soon as it is known
        let (pid_tx, pid_rx) = oneshot::channel();
        {
            let store = self.store.clone();
            let execution_id = execution.id.clone();
            tokio::spawn(async move {
                if let Ok(pid) = pid_rx.await {
                    if let Err(err) = store.set_execution_pid(&execution_id, pid) {
                        tracing::warn!(execution_id = %execution_id, error = %err, "failed to record cli pid");
                    }
                }
            });
        }

        let session_snapshot = self.clock.now();
        let request = AgentRunRequest::new(prompt, project_dir.clone(), self.config.node_timeout)
            .with_pid_tx(pid_tx);

        let run_result = match &parent {
            Some(parent_exec) => {
                let session = parent_exec.session_id.as_deref().unwrap_or_default();
                adapter.resume(session, request).await
            }
            None => adapter.run(request).await,
        };

        let output = match run_result {
            Ok(output) => output,
            Err(err) => AgentRunOutput {
                stdout: String::new(),
                stderr: err.to_string(),
                exit_code: None,
                timed_out: false,
            },
        };

        let detected_session = adapter
            .detect_new_session(&project_dir, session_snapshot)
            .await
            .unwrap_or_else(|err| {
                tracing::warn!(node_id = %node.id, error = %err, "session detection failed");
                None
            });

        // Re-read the row: callback-written fields win over text scraping
        let execution = self.store.execution(&execution.id)?;
        let verdict = classify(
            &execution,
            &output,
            detected_session.is_some(),
            self.config.strip_echoed_prompt,
        );

        let completed_at = self.clock.now();
        let actual_minutes = execution.elapsed_minutes(completed_at);

        let final_status = match verdict {
            RunVerdict::Done { summary } => {
                let artifacts = self.handoff_artifacts(&blueprint, &node, &nodes, &summary);
                self.store.finish_execution(ExecutionFinish {
                    execution_id: execution.id.clone(),
                    execution_status: ExecutionStatus::Done,
                    output_summary: Some(summary),
                    failure_reason: None,
                    session_id: detected_session.clone(),
                    node_status: Some(NodeStatus::Done),
                    node_error: None,
                    actual_minutes: Some(actual_minutes),
                    artifacts,
                    completed_at,
                })?;
                // The run already succeeded; a broken evaluation must not
                // fail the node after the fact
                if let Err(err) = self.collect_evaluation(&node.id).await {
                    tracing::warn!(node_id = %node.id, error = %err, "evaluation application failed");
                }
                NodeStatus::Done
            }
            RunVerdict::Blocked { info, text } => {
                self.store.set_blocker_info(&execution.id, &info)?;
                self.store.finish_execution(ExecutionFinish {
                    execution_id: execution.id.clone(),
                    execution_status: ExecutionStatus::Done,
                    output_summary: Some(text.clone()),
                    failure_reason: None,
                    session_id: detected_session.clone(),
                    node_status: Some(NodeStatus::Blocked),
                    node_error: Some(text),
                    actual_minutes: Some(actual_minutes),
                    artifacts: Vec::new(),
                    completed_at,
                })?;
                NodeStatus::Blocked
            }
            RunVerdict::Failed { reason, detail } => {
                let message = format!("{reason}: {detail}");
                self.store.finish_execution(ExecutionFinish {
                    execution_id: execution.id.clone(),
                    execution_status: ExecutionStatus::Failed,
                    output_summary: Some(detail),
                    failure_reason: Some(reason),
                    session_id: detected_session.clone(),
                    node_status: Some(NodeStatus::Failed),
                    node_error: Some(message),
                    actual_minutes: Some(actual_minutes),
                    artifacts: Vec::new(),
                    completed_at,
                })?;
                NodeStatus::Failed
            }
        };

        tracing::info!(
            node_id = %node.id,
            execution_id = %execution.id,
            status = final_status.as_str(),
            actual_minutes,
            "agent run finished"
        );

        Ok(TaskOutcome::Completed(Some(final_status)))
    }

    fn assemble_prompt(
        &self,
        blueprint: &Blueprint,
        node: &MacroNode,
        nodes: &[MacroNode],
        resume: bool,
    ) -> Result<String, EngineError> {
        let step_index = nodes.iter().position(|n| n.id == node.id).unwrap_or(0) + 1;

        let mut handoffs = Vec::new();
        for dep_id in &node.dependencies {
            let Some(dep) = nodes.iter().find(|n| &n.id == dep_id) else {
                continue;
            };
            if let Some(artifact) = self.store.handoff_for(dep_id, &node.id)? {
                handoffs.push(DependencyHandoff {
                    order: dep.node_order,
                    title: dep.title.clone(),
                    content: artifact.content,
                });
            }
        }

        let args = RunPromptArgs {
            blueprint,
            node,
            step_index,
            step_count: nodes.len(),
            handoffs: &handoffs,
            callback_base: &self.config.callback_base,
        };
        Ok(if resume {
            build_resume_prompt(&args)
        } else {
            build_run_prompt(&args)
        })
    }

    /// Artifact fan-out on success: one targeted handoff per known dependent,
    /// else a single untargeted one for later adoption.
    fn handoff_artifacts(
        &self,
        blueprint: &Blueprint,
        node: &MacroNode,
        nodes: &[MacroNode],
        summary: &str,
    ) -> Vec<Artifact> {
        let dependents: Vec<&MacroNode> =
            nodes.iter().filter(|n| n.depends_on(&node.id)).collect();
        let created_at = self.clock.now();

        let make = |target: Option<NodeId>| Artifact {
            id: ArtifactId::new(self.ids.next()),
            blueprint_id: blueprint.id.clone(),
            source_node_id: node.id.clone(),
            target_node_id: target,
            kind: ArtifactKind::HandoffSummary,
            content: summary.to_string(),
            created_at,
        };

        if dependents.is_empty() {
            vec![make(None)]
        } else {
            dependents
                .into_iter()
                .map(|d| make(Some(d.id.clone())))
                .collect()
        }
    }

    /// Wait out the evaluation grace window, then apply whatever arrived.
    /// Silence means COMPLETE with no mutations.
    async fn collect_evaluation(&self, node_id: &NodeId) -> Result<(), EngineError> {
        let poll = std::time::Duration::from_millis(50);
        let deadline = tokio::time::Instant::now() + self.config.evaluation_grace;

        let body = loop {
            if let Some(body) = self.inbox.take(node_id) {
                break body;
            }
            if tokio::time::Instant::now() >= deadline {
                break EvaluationBody::complete();
            }
            tokio::time::sleep(poll).await;
        };

        let applied = apply_evaluation(&self.store, &self.clock, &self.ids, node_id, &body, false)?;
        if !applied.created_nodes.is_empty() {
            tracing::info!(
                node_id = %node_id,
                created = applied.created_nodes.len(),
                "evaluation mutated the graph"
            );
        }
        Ok(())
    }

    // ── Batch bookkeeping ───────────────────────────────────────────────────

    fn handle_batch_progress(&self, batch: &Arc<RunAllBatch>, node_id: &NodeId, outcome: &TaskOutcome) {
        batch.finish_member(node_id);

        match outcome {
            TaskOutcome::Completed(Some(NodeStatus::Done)) => {
                self.admit_new_candidates(batch);
            }
            TaskOutcome::Cancelled => {}
            _ => {
                let remaining = batch.abort();
                for id in remaining {
                    match self
                        .store
                        .set_node_status_if(&id, NodeStatus::Queued, NodeStatus::Pending)
                    {
                        Ok(true) => {
                            self.pending
                                .remove(&batch.blueprint_id, Some(&id), Some(TaskType::Run));
                        }
                        Ok(false) => {}
                        Err(err) => {
                            tracing::warn!(node_id = %id, error = %err, "batch reset failed");
                        }
                    }
                }
                tracing::warn!(
                    blueprint_id = %batch.blueprint_id,
                    failed_node = %node_id,
                    "run-all aborted; remaining nodes reset to pending"
                );
            }
        }
    }

    /// After a successful batch run, admit pending nodes whose dependencies
    /// just became satisfied (refinement nodes appear mid-batch this way).
    fn admit_new_candidates(&self, batch: &Arc<RunAllBatch>) {
        let Ok(nodes) = self.store.nodes_for_blueprint(&batch.blueprint_id) else {
            return;
        };
        let by_id = index_nodes(&nodes);

        for node in &nodes {
            if node.status != NodeStatus::Pending {
                continue;
            }
            if check_executable(node, &by_id).is_err() {
                continue;
            }
            if self
                .pending
                .contains(&batch.blueprint_id, Some(&node.id), Some(TaskType::Run))
            {
                continue;
            }
            if let Err(err) = self
                .store
                .set_node_status(&node.id, NodeStatus::Queued, None)
            {
                tracing::warn!(node_id = %node.id, error = %err, "failed to queue next candidate");
                continue;
            }
            batch.admit(node.id.clone());
            self.pending.add(
                &batch.blueprint_id,
                TaskType::Run,
                Some(node.id.clone()),
                self.clock.now(),
            );
            let _ = self.enqueue_run(
                &batch.blueprint_id,
                node.id.clone(),
                None,
                Some(batch.clone()),
                TaskType::Run,
            );
            tracing::info!(node_id = %node.id, "admitted next run-all candidate");
        }
    }

    fn refresh_blueprint_status(&self, blueprint_id: &BlueprintId) -> Result<(), EngineError> {
        let blueprint = self.store.blueprint(blueprint_id)?;
        if !matches!(
            blueprint.status,
            BlueprintStatus::Running | BlueprintStatus::Approved
        ) {
            return Ok(());
        }

        let nodes = self.store.nodes_for_blueprint(blueprint_id)?;
        if !nodes.is_empty()
            && nodes
                .iter()
                .all(|n| matches!(n.status, NodeStatus::Done | NodeStatus::Skipped))
        {
            self.store
                .set_blueprint_status(blueprint_id, BlueprintStatus::Done)?;
            tracing::info!(blueprint_id = %blueprint_id, "blueprint complete");
            return Ok(());
        }

        let active = nodes
            .iter()
            .any(|n| matches!(n.status, NodeStatus::Queued | NodeStatus::Running));
        if !active && blueprint.status == BlueprintStatus::Running {
            self.store
                .set_blueprint_status(blueprint_id, BlueprintStatus::Approved)?;
        }
        Ok(())
    }

    // ── Helper sessions (reevaluate / enrich) ───────────────────────────────

    async fn execute_helper(&self, node_id: NodeId, task_type: TaskType) -> TaskOutcome {
        let blueprint_id = self.store.node(&node_id).map(|n| n.blueprint_id);
        let result = self.run_helper(&node_id, task_type).await;
        if let Ok(blueprint_id) = blueprint_id {
            self.pending
                .remove(&blueprint_id, Some(&node_id), Some(task_type));
        }
        match result {
            Ok(()) => TaskOutcome::Completed(None),
            Err(err) => {
                tracing::error!(node_id = %node_id, task = %task_type, error = %err, "helper task failed");
                TaskOutcome::Failed(err.to_string())
            }
        }
    }

    async fn run_helper(&self, node_id: &NodeId, task_type: TaskType) -> Result<(), EngineError> {
        let node = self.store.node(node_id)?;
        let blueprint = self.store.blueprint(&node.blueprint_id)?;
        let Some(project_dir) = blueprint.project_dir.clone() else {
            return Err(EngineError::InvalidState(
                "blueprint has no project directory".to_string(),
            ));
        };

        let prompt = match task_type {
            TaskType::Enrich => build_enrich_prompt(&blueprint, &node, &self.config.callback_base),
            _ => build_reevaluate_prompt(&blueprint, &node, &self.config.callback_base),
        };

        let adapter = self
            .agents
            .resolve(node.agent_type.as_deref().or(blueprint.agent_type.as_deref()))?;

        let snapshot = self.clock.now();
        let request = AgentRunRequest::new(prompt, project_dir.clone(), self.config.node_timeout);
        adapter.run_interactive(request).await?;

        if let Some(session_id) = adapter
            .detect_new_session(&project_dir, snapshot)
            .await
            .unwrap_or(None)
        {
            let kind = match task_type {
                TaskType::Enrich => RelatedSessionKind::Enrich,
                _ => RelatedSessionKind::Reevaluate,
            };
            self.store.create_related_session(&RelatedSession {
                id: self.ids.next(),
                blueprint_id: blueprint.id.clone(),
                node_id: node.id.clone(),
                session_id,
                kind,
                created_at: self.clock.now(),
            })?;
        }

        // Collect the posted body within the grace window
        let poll = std::time::Duration::from_millis(50);
        let deadline = tokio::time::Instant::now() + self.config.evaluation_grace;
        let body = loop {
            if let Some(body) = self.inbox.take(node_id) {
                break Some(body);
            }
            if tokio::time::Instant::now() >= deadline {
                break None;
            }
            tokio::time::sleep(poll).await;
        };

        let Some(body) = body else {
            tracing::warn!(node_id = %node_id, task = %task_type, "no evaluation callback arrived");
            return Ok(());
        };

        match task_type {
            TaskType::Enrich => {
                // Enrich only rewrites text, never status or graph shape
                if let Some(update) = &body.node_update {
                    self.store.update_node_text(
                        node_id,
                        update.title.as_deref(),
                        update.description.as_deref(),
                    )?;
                }
                Ok(())
            }
            _ => {
                apply_evaluation(&self.store, &self.clock, &self.ids, node_id, &body, true)?;
                Ok(())
            }
        }
    }
}

#[cfg(test)]
#[path = "driver_tests.rs"]
mod tests;
