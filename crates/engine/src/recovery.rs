// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Crash recovery
//!
//! Runs once at boot, before the HTTP listener accepts work: triages stale
//! running executions (monitor / finalize / fail), reverts false
//! restart-failures, unsticks blueprints, and re-enqueues orphaned queued
//! nodes. The monitor loop then re-checks surviving executions until they
//! settle or hit their absolute deadline.
//!
//! This subsystem is the only actor that writes to a running execution it did
//! not create. Per-item errors are logged and recovery continues.

use crate::config::FALSE_FAILURE_LOOKBACK;
use crate::driver::{ExecutionDriver, RunAllBatch};
use fm_core::{
    BlueprintStatus, Clock, ExecutionStatus, FailureReason, IdGen, MacroNode, NodeExecution,
    NodeStatus,
};
use fm_storage::ExecutionFinish;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Synthetic summary for executions that completed while the server was down.
pub const RECOVERED_SUMMARY: &str = "Recovered after server restart";
/// Summary and node error for executions that did not survive the restart.
pub const INTERRUPTED_SUMMARY: &str = "Server restarted while execution was running";
pub const INTERRUPTED_NODE_ERROR: &str = "Execution interrupted by server restart";

/// What startup recovery did, for the boot log.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RecoveryReport {
    pub finalized: usize,
    pub failed: usize,
    pub monitoring: usize,
    pub reverted: usize,
    pub unstuck_blueprints: usize,
    pub re_enqueued: usize,
}

struct MonitorEntry {
    execution: NodeExecution,
    project_dir: PathBuf,
    deadline: DateTime<Utc>,
}

/// Startup recovery plus the periodic liveness monitor.
#[derive(Clone)]
pub struct RecoverySubsystem<C: Clock, G: IdGen> {
    driver: ExecutionDriver<C, G>,
    monitored: Arc<Mutex<Vec<MonitorEntry>>>,
}

impl<C: Clock, G: IdGen + 'static> RecoverySubsystem<C, G> {
    pub fn new(driver: ExecutionDriver<C, G>) -> Self {
        Self {
            driver,
            monitored: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn monitored_count(&self) -> usize {
        self.monitored.lock().len()
    }

    /// Run the full startup pass. Must complete before new tasks are admitted.
    pub async fn run_startup(&self) -> RecoveryReport {
        let mut report = RecoveryReport::default();

        self.triage_stale_executions(&mut report).await;
        self.revert_false_failures(&mut report).await;
        self.unstick_blueprints(&mut report);
        self.re_enqueue_orphans(&mut report);

        tracing::info!(
            finalized = report.finalized,
            failed = report.failed,
            monitoring = report.monitoring,
            reverted = report.reverted,
            unstuck = report.unstuck_blueprints,
            re_enqueued = report.re_enqueued,
            "startup recovery complete"
        );
        report
    }

    /// Spawn the periodic monitor re-check loop.
    pub fn spawn_monitor_loop(&self) -> tokio::task::JoinHandle<()> {
        let recovery = self.clone();
        let interval = recovery.driver.config().monitor_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                recovery.monitor_tick().await;
            }
        })
    }

    // ── Smart stale-execution triage ────────────────────────────────────────

    async fn triage_stale_executions(&self, report: &mut RecoveryReport) {
        let store = self.driver.store();
        let stale = match store.running_executions() {
            Ok(rows) => rows,
            Err(err) => {
                tracing::error!(error = %err, "failed to load running executions");
                return;
            }
        };

        for (execution, project_dir) in stale {
            // Without a project cwd there is no session to look for
            let Some(project_dir) = project_dir else {
                self.fail_interrupted(&execution);
                report.failed += 1;
                continue;
            };

            if let Some(pid) = execution.cli_pid {
                if pid_alive(pid).await {
                    tracing::info!(
                        execution_id = %execution.id,
                        pid,
                        "stale execution still has a live process; monitoring"
                    );
                    let deadline =
                        execution.started_at + to_delta(self.driver.config().monitor_deadline);
                    self.monitored.lock().push(MonitorEntry {
                        execution,
                        project_dir,
                        deadline,
                    });
                    report.monitoring += 1;
                    continue;
                }
            }

            match self.session_evidence(&execution, &project_dir).await {
                Some(session_id) => {
                    self.finalize_recovered(&execution, session_id);
                    report.finalized += 1;
                }
                None => {
                    self.fail_interrupted(&execution);
                    report.failed += 1;
                }
            }
        }
    }

    /// Evidence that the agent actually ran: a recorded session id, or a
    /// session file for this project modified after the execution started.
    /// A session already owned by another execution is never stolen.
    async fn session_evidence(
        &self,
        execution: &NodeExecution,
        project_dir: &Path,
    ) -> Option<Option<String>> {
        if execution.session_id.is_some() {
            // Already recorded; nothing to assign
            return Some(None);
        }

        let adapter = self.resolve_adapter(execution)?;
        let detected = adapter
            .detect_new_session(project_dir, execution.started_at)
            .await
            .unwrap_or(None)?;

        match self.driver.store().session_owner(&detected) {
            Ok(Some(owner)) if owner != execution.id => {
                tracing::warn!(
                    execution_id = %execution.id,
                    session_id = %detected,
                    owner = %owner,
                    "refusing to steal session owned by another execution"
                );
                None
            }
            Ok(_) => Some(Some(detected)),
            Err(err) => {
                tracing::warn!(execution_id = %execution.id, error = %err, "session owner lookup failed");
                None
            }
        }
    }

    fn resolve_adapter(
        &self,
        execution: &NodeExecution,
    ) -> Option<std::sync::Arc<dyn fm_adapters::AgentAdapter>> {
        let store = self.driver.store();
        let agent_type = store
            .node(&execution.node_id)
            .ok()
            .and_then(|n| n.agent_type)
            .or_else(|| {
                store
                    .blueprint(&execution.blueprint_id)
                    .ok()
                    .and_then(|b| b.agent_type)
            });
        match self.driver.agents().resolve(agent_type.as_deref()) {
            Ok(adapter) => Some(adapter),
            Err(err) => {
                tracing::warn!(execution_id = %execution.id, error = %err, "no adapter for recovery check");
                None
            }
        }
    }

    fn finalize_recovered(&self, execution: &NodeExecution, new_session: Option<String>) {
        let completed_at = self.driver.clock().now();
        let minutes = execution.elapsed_minutes(completed_at);
        let result = self.driver.store().finish_execution(ExecutionFinish {
            execution_id: execution.id.clone(),
            execution_status: ExecutionStatus::Done,
            output_summary: Some(RECOVERED_SUMMARY.to_string()),
            failure_reason: None,
            session_id: new_session,
            node_status: Some(NodeStatus::Done),
            node_error: None,
            actual_minutes: Some(minutes),
            artifacts: Vec::new(),
            completed_at,
        });
        match result {
            Ok(()) => tracing::info!(execution_id = %execution.id, "finalized recovered execution"),
            Err(err) => {
                tracing::error!(execution_id = %execution.id, error = %err, "failed to finalize execution")
            }
        }
    }

    fn fail_interrupted(&self, execution: &NodeExecution) {
        let completed_at = self.driver.clock().now();
        let result = self.driver.store().finish_execution(ExecutionFinish {
            execution_id: execution.id.clone(),
            execution_status: ExecutionStatus::Failed,
            output_summary: Some(INTERRUPTED_SUMMARY.to_string()),
            failure_reason: Some(FailureReason::Error),
            session_id: None,
            node_status: Some(NodeStatus::Failed),
            node_error: Some(INTERRUPTED_NODE_ERROR.to_string()),
            actual_minutes: None,
            artifacts: Vec::new(),
            completed_at,
        });
        match result {
            Ok(()) => tracing::info!(execution_id = %execution.id, "failed interrupted execution"),
            Err(err) => {
                tracing::error!(execution_id = %execution.id, error = %err, "failed to fail execution")
            }
        }
    }

    // ── False-failure reversion ─────────────────────────────────────────────

    async fn revert_false_failures(&self, report: &mut RecoveryReport) {
        let store = self.driver.store();
        let cutoff = self.driver.clock().now() - to_delta(FALSE_FAILURE_LOOKBACK);
        let candidates = match store.failed_executions_since(cutoff, "Server restarted") {
            Ok(rows) => rows,
            Err(err) => {
                tracing::error!(error = %err, "failed to load restart failures");
                return;
            }
        };

        for execution in candidates {
            let Some(session_id) = execution.session_id.clone() else {
                continue;
            };
            let Ok(blueprint) = store.blueprint(&execution.blueprint_id) else {
                continue;
            };
            let Some(project_dir) = blueprint.project_dir else {
                continue;
            };
            let Some(adapter) = self.resolve_adapter(&execution) else {
                continue;
            };

            let alive = adapter
                .is_session_alive(
                    &project_dir,
                    &session_id,
                    self.driver.config().session_alive_window,
                )
                .await
                .unwrap_or(false);
            if !alive {
                continue;
            }

            match store.revert_execution_to_running(&execution.id) {
                Ok(()) => {
                    tracing::info!(
                        execution_id = %execution.id,
                        session_id = %session_id,
                        "reverted false restart-failure; session is still alive"
                    );
                    let deadline =
                        execution.started_at + to_delta(self.driver.config().monitor_deadline);
                    self.monitored.lock().push(MonitorEntry {
                        execution,
                        project_dir,
                        deadline,
                    });
                    report.reverted += 1;
                }
                Err(err) => {
                    tracing::error!(execution_id = %execution.id, error = %err, "reversion failed")
                }
            }
        }
    }

    // ── Blueprint unstick ───────────────────────────────────────────────────

    fn unstick_blueprints(&self, report: &mut RecoveryReport) {
        let store = self.driver.store();
        let blueprints = match store.list_blueprints() {
            Ok(rows) => rows,
            Err(err) => {
                tracing::error!(error = %err, "failed to list blueprints");
                return;
            }
        };

        for blueprint in blueprints {
            if blueprint.status != BlueprintStatus::Running {
                continue;
            }
            let Ok(nodes) = store.nodes_for_blueprint(&blueprint.id) else {
                continue;
            };
            let active = nodes
                .iter()
                .any(|n| matches!(n.status, NodeStatus::Running | NodeStatus::Queued));
            if active {
                continue;
            }
            match store.set_blueprint_status(&blueprint.id, BlueprintStatus::Approved) {
                Ok(()) => {
                    tracing::info!(blueprint_id = %blueprint.id, "unstuck idle running blueprint");
                    report.unstuck_blueprints += 1;
                }
                Err(err) => {
                    tracing::error!(blueprint_id = %blueprint.id, error = %err, "unstick failed")
                }
            }
        }
    }

    // ── Orphan re-enqueue ───────────────────────────────────────────────────

    fn re_enqueue_orphans(&self, report: &mut RecoveryReport) {
        let store = self.driver.store();
        let orphans = match store.queued_nodes() {
            Ok(rows) => rows,
            Err(err) => {
                tracing::error!(error = %err, "failed to load queued nodes");
                return;
            }
        };

        let mut by_blueprint: HashMap<fm_core::BlueprintId, Vec<MacroNode>> = HashMap::new();
        for node in orphans {
            by_blueprint
                .entry(node.blueprint_id.clone())
                .or_default()
                .push(node);
        }

        for (blueprint_id, nodes) in by_blueprint {
            let batch = RunAllBatch::new(blueprint_id.clone(), Vec::new());
            for node in nodes {
                if self.driver.enqueue_orphan(&node, &batch).is_some() {
                    tracing::info!(node_id = %node.id, "re-enqueued orphaned node");
                    report.re_enqueued += 1;
                }
            }
        }
    }

    // ── Monitor loop ────────────────────────────────────────────────────────

    /// One monitor pass: drop entries whose process finished or deadline
    /// passed, finalizing or failing them by the session-evidence policy.
    pub async fn monitor_tick(&self) {
        let entries: Vec<(fm_core::ExecutionId, PathBuf, DateTime<Utc>, Option<u32>)> = {
            let monitored = self.monitored.lock();
            monitored
                .iter()
                .map(|e| {
                    (
                        e.execution.id.clone(),
                        e.project_dir.clone(),
                        e.deadline,
                        e.execution.cli_pid,
                    )
                })
                .collect()
        };

        let now = self.driver.clock().now();
        let mut settled = Vec::new();

        for (execution_id, project_dir, deadline, pid) in entries {
            let alive = match pid {
                Some(pid) => pid_alive(pid).await,
                None => false,
            };
            if alive && now < deadline {
                continue;
            }

            // Re-read the row: the execution may have settled on its own
            let execution = match self.driver.store().execution(&execution_id) {
                Ok(exec) => exec,
                Err(err) => {
                    tracing::warn!(execution_id = %execution_id, error = %err, "monitored execution vanished");
                    settled.push(execution_id);
                    continue;
                }
            };
            if execution.status != ExecutionStatus::Running {
                settled.push(execution_id);
                continue;
            }

            if now >= deadline {
                tracing::warn!(execution_id = %execution_id, "monitored execution hit its deadline");
            }
            match self.session_evidence(&execution, &project_dir).await {
                Some(session_id) => self.finalize_recovered(&execution, session_id),
                None => self.fail_interrupted(&execution),
            }
            settled.push(execution_id);
        }

        if !settled.is_empty() {
            let mut monitored = self.monitored.lock();
            monitored.retain(|e| !settled.contains(&e.execution.id));
        }
    }
}

fn to_delta(duration: std::time::Duration) -> chrono::TimeDelta {
    chrono::TimeDelta::from_std(duration).unwrap_or_else(|_| chrono::TimeDelta::zero())
}

/// Whether the OS still reports `pid` as an existing process.
async fn pid_alive(pid: u32) -> bool {
    if cfg!(target_os = "linux") {
        return Path::new(&format!("/proc/{pid}")).exists();
    }
    tokio::process::Command::new("kill")
        .args(["-0", &pid.to_string()])
        .status()
        .await
        .map(|status| status.success())
        .unwrap_or(false)
}

#[cfg(test)]
#[path = "recovery_tests.rs"]
mod tests;
