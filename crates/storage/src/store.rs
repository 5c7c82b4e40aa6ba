// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The executor's persistent store over a single SQLite file

use crate::schema;
use crate::StoreError;
use chrono::{DateTime, Utc};
use fm_core::{
    Artifact, ArtifactId, ArtifactKind, Blueprint, BlueprintId, BlueprintStatus, ContextHealth,
    ExecutionId, ExecutionKind, ExecutionStatus, FailureReason, MacroNode, NodeExecution, NodeId,
    NodeStatus, RelatedSession, RelatedSessionKind, ReportedStatus,
};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Everything the UI (or a prompt builder) needs about one blueprint,
/// loaded in three statements — no per-node queries.
#[derive(Debug, Clone)]
pub struct BlueprintGraph {
    pub blueprint: Blueprint,
    pub nodes: Vec<MacroNode>,
    pub artifacts: Vec<Artifact>,
    pub executions: Vec<NodeExecution>,
}

/// Final write for a finished execution: execution row, owning node status,
/// actual minutes and produced artifacts flip together in one transaction.
#[derive(Debug)]
pub struct ExecutionFinish {
    pub execution_id: ExecutionId,
    pub execution_status: ExecutionStatus,
    pub output_summary: Option<String>,
    pub failure_reason: Option<FailureReason>,
    /// Session id detected after process exit (kept if already set).
    pub session_id: Option<String>,
    /// `None` leaves the node untouched (cancelled executions).
    pub node_status: Option<NodeStatus>,
    pub node_error: Option<String>,
    pub actual_minutes: Option<i64>,
    pub artifacts: Vec<Artifact>,
    pub completed_at: DateTime<Utc>,
}

/// Handle to the embedded database.
///
/// Cheap to clone; all access serializes through one connection mutex.
#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

impl Store {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        schema::init_schema(&conn)?;
        tracing::debug!(path = %path.display(), "opened executor store");
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        schema::init_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub(crate) fn with_conn<T>(
        &self,
        f: impl FnOnce(&mut Connection) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let mut conn = self.conn.lock();
        f(&mut conn)
    }

    // ── Blueprints ──────────────────────────────────────────────────────────

    pub fn create_blueprint(&self, bp: &Blueprint) -> Result<(), StoreError> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO blueprints (id, title, description, project_dir, agent_type, status, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    bp.id.as_str(),
                    bp.title,
                    bp.description,
                    bp.project_dir.as_ref().map(|p| p.display().to_string()),
                    bp.agent_type,
                    bp.status.as_str(),
                    fmt_ts(bp.created_at),
                ],
            )?;
            Ok(())
        })
    }

    pub fn blueprint(&self, id: &BlueprintId) -> Result<Blueprint, StoreError> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT id, title, description, project_dir, agent_type, status, created_at
                 FROM blueprints WHERE id = ?1",
                [id.as_str()],
                blueprint_from_row,
            )
            .optional()?
            .ok_or_else(|| StoreError::not_found("blueprint", id.as_str()))
        })
    }

    pub fn list_blueprints(&self) -> Result<Vec<Blueprint>, StoreError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, title, description, project_dir, agent_type, status, created_at
                 FROM blueprints ORDER BY created_at",
            )?;
            let rows = stmt
                .query_map([], blueprint_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn set_blueprint_status(
        &self,
        id: &BlueprintId,
        status: BlueprintStatus,
    ) -> Result<(), StoreError> {
        self.with_conn(|conn| {
            let n = conn.execute(
                "UPDATE blueprints SET status = ?2 WHERE id = ?1",
                params![id.as_str(), status.as_str()],
            )?;
            if n == 0 {
                return Err(StoreError::not_found("blueprint", id.as_str()));
            }
            Ok(())
        })
    }

    pub fn delete_blueprint(&self, id: &BlueprintId) -> Result<(), StoreError> {
        self.with_conn(|conn| {
            conn.execute("DELETE FROM blueprints WHERE id = ?1", [id.as_str()])?;
            Ok(())
        })
    }

    // ── Nodes ───────────────────────────────────────────────────────────────

    pub fn create_node(&self, node: &MacroNode) -> Result<(), StoreError> {
        self.with_conn(|conn| insert_node(conn, node))
    }

    pub fn node(&self, id: &NodeId) -> Result<MacroNode, StoreError> {
        self.with_conn(|conn| lookup_node(conn, id))
    }

    pub fn nodes_for_blueprint(&self, id: &BlueprintId) -> Result<Vec<MacroNode>, StoreError> {
        self.with_conn(|conn| blueprint_nodes(conn, id))
    }

    pub fn update_node(&self, node: &MacroNode) -> Result<(), StoreError> {
        self.with_conn(|conn| update_node_row(conn, node))
    }

    /// Partial title/description rewrite (reevaluate/enrich flows).
    pub fn update_node_text(
        &self,
        id: &NodeId,
        title: Option<&str>,
        description: Option<&str>,
    ) -> Result<(), StoreError> {
        self.with_conn(|conn| {
            let n = conn.execute(
                "UPDATE macro_nodes
                 SET title = COALESCE(?2, title), description = COALESCE(?3, description)
                 WHERE id = ?1",
                params![id.as_str(), title, description],
            )?;
            if n == 0 {
                return Err(StoreError::not_found("node", id.as_str()));
            }
            Ok(())
        })
    }

    pub fn set_node_status(
        &self,
        id: &NodeId,
        status: NodeStatus,
        error: Option<&str>,
    ) -> Result<(), StoreError> {
        self.with_conn(|conn| {
            let n = conn.execute(
                "UPDATE macro_nodes SET status = ?2, error = ?3 WHERE id = ?1",
                params![id.as_str(), status.as_str(), error],
            )?;
            if n == 0 {
                return Err(StoreError::not_found("node", id.as_str()));
            }
            Ok(())
        })
    }

    /// Conditional status flip: applies only when the row still holds `from`.
    ///
    /// Returns whether a row was updated. This is the primitive behind
    /// idempotent recovery (`queued → pending` never touches rows that have
    /// already advanced).
    pub fn set_node_status_if(
        &self,
        id: &NodeId,
        from: NodeStatus,
        to: NodeStatus,
    ) -> Result<bool, StoreError> {
        self.with_conn(|conn| {
            let n = conn.execute(
                "UPDATE macro_nodes SET status = ?3 WHERE id = ?1 AND status = ?2",
                params![id.as_str(), from.as_str(), to.as_str()],
            )?;
            Ok(n > 0)
        })
    }

    /// Flip a set of nodes to one status in a single transaction (run-all
    /// pre-queueing).
    pub fn set_nodes_status(
        &self,
        ids: &[NodeId],
        status: NodeStatus,
    ) -> Result<(), StoreError> {
        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            for id in ids {
                tx.execute(
                    "UPDATE macro_nodes SET status = ?2, error = NULL WHERE id = ?1",
                    params![id.as_str(), status.as_str()],
                )?;
            }
            tx.commit()?;
            Ok(())
        })
    }

    pub fn delete_node(&self, id: &NodeId) -> Result<(), StoreError> {
        self.with_conn(|conn| {
            conn.execute("DELETE FROM macro_nodes WHERE id = ?1", [id.as_str()])?;
            Ok(())
        })
    }

    // ── Executions ──────────────────────────────────────────────────────────

    pub fn create_execution(&self, exec: &NodeExecution) -> Result<(), StoreError> {
        self.with_conn(|conn| insert_execution(conn, exec))
    }

    pub fn execution(&self, id: &ExecutionId) -> Result<NodeExecution, StoreError> {
        self.with_conn(|conn| {
            conn.query_row(
                &format!("{EXECUTION_SELECT} WHERE id = ?1"),
                [id.as_str()],
                execution_from_row,
            )
            .optional()?
            .ok_or_else(|| StoreError::not_found("execution", id.as_str()))
        })
    }

    pub fn executions_for_node(&self, id: &NodeId) -> Result<Vec<NodeExecution>, StoreError> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare(&format!("{EXECUTION_SELECT} WHERE node_id = ?1 ORDER BY started_at"))?;
            let rows = stmt
                .query_map([id.as_str()], execution_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// The execution row the HTTP callbacks key on.
    pub fn latest_running_execution(
        &self,
        node_id: &NodeId,
    ) -> Result<Option<NodeExecution>, StoreError> {
        self.with_conn(|conn| {
            Ok(conn
                .query_row(
                    &format!(
                        "{EXECUTION_SELECT} WHERE node_id = ?1 AND status = 'running'
                         ORDER BY started_at DESC LIMIT 1"
                    ),
                    [node_id.as_str()],
                    execution_from_row,
                )
                .optional()?)
        })
    }

    pub fn set_execution_pid(&self, id: &ExecutionId, pid: u32) -> Result<(), StoreError> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE node_executions SET cli_pid = ?2 WHERE id = ?1",
                params![id.as_str(), pid as i64],
            )?;
            Ok(())
        })
    }

    pub fn set_execution_session(
        &self,
        id: &ExecutionId,
        session_id: &str,
    ) -> Result<(), StoreError> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE node_executions SET session_id = ?2 WHERE id = ?1",
                params![id.as_str(), session_id],
            )?;
            Ok(())
        })
    }

    pub fn set_reported_status(
        &self,
        id: &ExecutionId,
        status: ReportedStatus,
        reason: Option<&str>,
    ) -> Result<(), StoreError> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE node_executions SET reported_status = ?2, reported_reason = ?3 WHERE id = ?1",
                params![id.as_str(), status.as_str(), reason],
            )?;
            Ok(())
        })
    }

    pub fn set_blocker_info(
        &self,
        id: &ExecutionId,
        info: &serde_json::Value,
    ) -> Result<(), StoreError> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE node_executions SET blocker_info = ?2 WHERE id = ?1",
                params![id.as_str(), serde_json::to_string(info)?],
            )?;
            Ok(())
        })
    }

    pub fn set_task_summary(&self, id: &ExecutionId, summary: &str) -> Result<(), StoreError> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE node_executions SET task_summary = ?2 WHERE id = ?1",
                params![id.as_str(), summary],
            )?;
            Ok(())
        })
    }

    pub fn set_context_health(
        &self,
        id: &ExecutionId,
        health: &ContextHealth,
    ) -> Result<(), StoreError> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE node_executions
                 SET compaction_count = ?2, peak_tokens = ?3, pressure_level = ?4
                 WHERE id = ?1",
                params![
                    id.as_str(),
                    health.compaction_count,
                    health.peak_tokens,
                    health.pressure_level
                ],
            )?;
            Ok(())
        })
    }

    /// Finish an execution and flip its node in one transaction.
    pub fn finish_execution(&self, fin: ExecutionFinish) -> Result<(), StoreError> {
        self.with_conn(|conn| {
            let tx = conn.transaction()?;

            let n = tx.execute(
                "UPDATE node_executions
                 SET status = ?2,
                     output_summary = COALESCE(?3, output_summary),
                     failure_reason = ?4,
                     session_id = COALESCE(session_id, ?5),
                     completed_at = ?6
                 WHERE id = ?1",
                params![
                    fin.execution_id.as_str(),
                    fin.execution_status.as_str(),
                    fin.output_summary,
                    fin.failure_reason.map(|r| r.as_str()),
                    fin.session_id,
                    fmt_ts(fin.completed_at),
                ],
            )?;
            if n == 0 {
                return Err(StoreError::not_found("execution", fin.execution_id.as_str()));
            }

            let node_id: String = tx.query_row(
                "SELECT node_id FROM node_executions WHERE id = ?1",
                [fin.execution_id.as_str()],
                |row| row.get(0),
            )?;

            if let Some(status) = fin.node_status {
                tx.execute(
                    "UPDATE macro_nodes SET status = ?2, error = ?3 WHERE id = ?1",
                    params![node_id, status.as_str(), fin.node_error],
                )?;
            }
            if let Some(minutes) = fin.actual_minutes {
                tx.execute(
                    "UPDATE macro_nodes SET actual_minutes = ?2 WHERE id = ?1",
                    params![node_id, minutes],
                )?;
            }
            for artifact in &fin.artifacts {
                insert_artifact(&tx, artifact)?;
            }

            tx.commit()?;
            Ok(())
        })
    }

    // ── Crash-recovery queries ──────────────────────────────────────────────

    /// All executions still marked running, with the owning blueprint's
    /// project directory joined in.
    pub fn running_executions(
        &self,
    ) -> Result<Vec<(NodeExecution, Option<PathBuf>)>, StoreError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT e.id, e.node_id, e.blueprint_id, e.session_id, e.kind, e.status,
                        e.input_context, e.output_summary, e.cli_pid, e.parent_execution_id,
                        e.blocker_info, e.task_summary, e.failure_reason, e.reported_status,
                        e.reported_reason, e.compaction_count, e.peak_tokens, e.pressure_level,
                        e.started_at, e.completed_at, b.project_dir
                 FROM node_executions e
                 JOIN blueprints b ON b.id = e.blueprint_id
                 WHERE e.status = 'running'
                 ORDER BY e.started_at",
            )?;
            let rows = stmt
                .query_map([], |row| {
                    let exec = execution_from_row(row)?;
                    let dir: Option<String> = row.get(20)?;
                    Ok((exec, dir.map(PathBuf::from)))
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// All nodes left in the executor-reserved `queued` status.
    pub fn queued_nodes(&self) -> Result<Vec<MacroNode>, StoreError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "{NODE_SELECT} WHERE status = 'queued' ORDER BY blueprint_id, node_order"
            ))?;
            let rows = stmt
                .query_map([], node_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Which execution currently owns a session id, if any.
    pub fn session_owner(&self, session_id: &str) -> Result<Option<ExecutionId>, StoreError> {
        self.with_conn(|conn| {
            Ok(conn
                .query_row(
                    "SELECT id FROM node_executions WHERE session_id = ?1 LIMIT 1",
                    [session_id],
                    |row| row.get::<_, String>(0),
                )
                .optional()?
                .map(ExecutionId::new))
        })
    }

    /// Executions failed at or after `cutoff` whose summary starts with `marker`.
    /// Feeds the false-failure reversion pass.
    pub fn failed_executions_since(
        &self,
        cutoff: DateTime<Utc>,
        marker: &str,
    ) -> Result<Vec<NodeExecution>, StoreError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "{EXECUTION_SELECT}
                 WHERE status = 'failed' AND completed_at >= ?1 AND output_summary LIKE ?2"
            ))?;
            let pattern = format!("{marker}%");
            let rows = stmt
                .query_map(params![fmt_ts(cutoff), pattern], execution_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Revert a falsely-failed execution and its node back to running.
    pub fn revert_execution_to_running(&self, id: &ExecutionId) -> Result<(), StoreError> {
        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            let node_id: String = tx
                .query_row(
                    "SELECT node_id FROM node_executions WHERE id = ?1",
                    [id.as_str()],
                    |row| row.get(0),
                )
                .optional()?
                .ok_or_else(|| StoreError::not_found("execution", id.as_str()))?;
            tx.execute(
                "UPDATE node_executions
                 SET status = 'running', completed_at = NULL, failure_reason = NULL,
                     output_summary = NULL
                 WHERE id = ?1",
                [id.as_str()],
            )?;
            tx.execute(
                "UPDATE macro_nodes SET status = 'running', error = NULL WHERE id = ?1",
                [node_id],
            )?;
            tx.commit()?;
            Ok(())
        })
    }

    // ── Artifacts ───────────────────────────────────────────────────────────

    pub fn create_artifact(&self, artifact: &Artifact) -> Result<(), StoreError> {
        self.with_conn(|conn| insert_artifact(conn, artifact))
    }

    pub fn artifacts_for_blueprint(&self, id: &BlueprintId) -> Result<Vec<Artifact>, StoreError> {
        self.with_conn(|conn| blueprint_artifacts(conn, id))
    }

    /// The handoff a dependent should read from one of its dependencies:
    /// the most recent artifact targeted at it, else the dependency's latest
    /// untargeted handoff.
    pub fn handoff_for(
        &self,
        source: &NodeId,
        target: &NodeId,
    ) -> Result<Option<Artifact>, StoreError> {
        self.with_conn(|conn| handoff_for_inner(conn, source, target))
    }

    // ── Related sessions ────────────────────────────────────────────────────

    pub fn create_related_session(&self, session: &RelatedSession) -> Result<(), StoreError> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO related_sessions (id, blueprint_id, node_id, session_id, kind, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    session.id,
                    session.blueprint_id.as_str(),
                    session.node_id.as_str(),
                    session.session_id,
                    session.kind.as_str(),
                    fmt_ts(session.created_at),
                ],
            )?;
            Ok(())
        })
    }

    pub fn related_sessions_for_node(
        &self,
        node_id: &NodeId,
    ) -> Result<Vec<RelatedSession>, StoreError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, blueprint_id, node_id, session_id, kind, created_at
                 FROM related_sessions WHERE node_id = ?1 ORDER BY created_at",
            )?;
            let rows = stmt
                .query_map([node_id.as_str()], related_session_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // ── Batch loader ────────────────────────────────────────────────────────

    /// Load one blueprint with its nodes, artifacts and executions.
    ///
    /// Exactly three child queries regardless of node count.
    pub fn load_blueprint_graph(&self, id: &BlueprintId) -> Result<BlueprintGraph, StoreError> {
        self.with_conn(|conn| {
            let blueprint = conn
                .query_row(
                    "SELECT id, title, description, project_dir, agent_type, status, created_at
                     FROM blueprints WHERE id = ?1",
                    [id.as_str()],
                    blueprint_from_row,
                )
                .optional()?
                .ok_or_else(|| StoreError::not_found("blueprint", id.as_str()))?;

            let nodes = blueprint_nodes(conn, id)?;
            let artifacts = blueprint_artifacts(conn, id)?;

            let mut stmt = conn.prepare(&format!(
                "{EXECUTION_SELECT} WHERE blueprint_id = ?1 ORDER BY started_at"
            ))?;
            let executions = stmt
                .query_map([id.as_str()], execution_from_row)?
                .collect::<Result<Vec<_>, _>>()?;

            Ok(BlueprintGraph {
                blueprint,
                nodes,
                artifacts,
                executions,
            })
        })
    }
}

// ── Row mapping ─────────────────────────────────────────────────────────────

pub(crate) const NODE_SELECT: &str = "SELECT id, blueprint_id, node_order, title, description, \
     prompt, dependencies, status, error, agent_type, estimated_minutes, actual_minutes, \
     created_at FROM macro_nodes";

pub(crate) const EXECUTION_SELECT: &str = "SELECT id, node_id, blueprint_id, session_id, kind, \
     status, input_context, output_summary, cli_pid, parent_execution_id, blocker_info, \
     task_summary, failure_reason, reported_status, reported_reason, compaction_count, \
     peak_tokens, pressure_level, started_at, completed_at FROM node_executions";

pub(crate) fn fmt_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339()
}

fn conversion_err(err: impl std::error::Error + Send + Sync + 'static) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(err))
}

fn bad_text(what: &str, value: &str) -> rusqlite::Error {
    conversion_err(std::io::Error::new(
        std::io::ErrorKind::InvalidData,
        format!("unrecognized {what}: {value}"),
    ))
}

fn parse_ts(value: String) -> Result<DateTime<Utc>, rusqlite::Error> {
    DateTime::parse_from_rfc3339(&value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(conversion_err)
}

fn parse_opt_ts(value: Option<String>) -> Result<Option<DateTime<Utc>>, rusqlite::Error> {
    value.map(parse_ts).transpose()
}

pub(crate) fn blueprint_from_row(row: &Row<'_>) -> Result<Blueprint, rusqlite::Error> {
    let status: String = row.get(5)?;
    Ok(Blueprint {
        id: BlueprintId::new(row.get::<_, String>(0)?),
        title: row.get(1)?,
        description: row.get(2)?,
        project_dir: row.get::<_, Option<String>>(3)?.map(PathBuf::from),
        agent_type: row.get(4)?,
        status: BlueprintStatus::parse(&status).ok_or_else(|| bad_text("blueprint status", &status))?,
        created_at: parse_ts(row.get(6)?)?,
    })
}

pub(crate) fn node_from_row(row: &Row<'_>) -> Result<MacroNode, rusqlite::Error> {
    let deps_json: String = row.get(6)?;
    let dependencies: Vec<String> = serde_json::from_str(&deps_json).map_err(conversion_err)?;
    let status: String = row.get(7)?;
    Ok(MacroNode {
        id: NodeId::new(row.get::<_, String>(0)?),
        blueprint_id: BlueprintId::new(row.get::<_, String>(1)?),
        node_order: row.get(2)?,
        title: row.get(3)?,
        description: row.get(4)?,
        prompt: row.get(5)?,
        dependencies: dependencies.into_iter().map(NodeId::new).collect(),
        status: NodeStatus::parse(&status).ok_or_else(|| bad_text("node status", &status))?,
        error: row.get(8)?,
        agent_type: row.get(9)?,
        estimated_minutes: row.get(10)?,
        actual_minutes: row.get(11)?,
        created_at: parse_ts(row.get(12)?)?,
    })
}

pub(crate) fn execution_from_row(row: &Row<'_>) -> Result<NodeExecution, rusqlite::Error> {
    let kind: String = row.get(4)?;
    let status: String = row.get(5)?;
    let blocker: Option<String> = row.get(10)?;
    let failure: Option<String> = row.get(12)?;
    let reported: Option<String> = row.get(13)?;
    Ok(NodeExecution {
        id: ExecutionId::new(row.get::<_, String>(0)?),
        node_id: NodeId::new(row.get::<_, String>(1)?),
        blueprint_id: BlueprintId::new(row.get::<_, String>(2)?),
        session_id: row.get(3)?,
        kind: ExecutionKind::parse(&kind).ok_or_else(|| bad_text("execution kind", &kind))?,
        status: ExecutionStatus::parse(&status)
            .ok_or_else(|| bad_text("execution status", &status))?,
        input_context: row.get(6)?,
        output_summary: row.get(7)?,
        cli_pid: row.get::<_, Option<i64>>(8)?.map(|p| p as u32),
        parent_execution_id: row.get::<_, Option<String>>(9)?.map(ExecutionId::new),
        blocker_info: blocker
            .map(|b| serde_json::from_str(&b))
            .transpose()
            .map_err(conversion_err)?,
        task_summary: row.get(11)?,
        failure_reason: failure
            .map(|f| FailureReason::parse(&f).ok_or_else(|| bad_text("failure reason", &f)))
            .transpose()?,
        reported_status: reported
            .map(|r| ReportedStatus::parse(&r).ok_or_else(|| bad_text("reported status", &r)))
            .transpose()?,
        reported_reason: row.get(14)?,
        context_health: ContextHealth {
            compaction_count: row.get(15)?,
            peak_tokens: row.get(16)?,
            pressure_level: row.get(17)?,
        },
        started_at: parse_ts(row.get(18)?)?,
        completed_at: parse_opt_ts(row.get(19)?)?,
    })
}

fn artifact_from_row(row: &Row<'_>) -> Result<Artifact, rusqlite::Error> {
    let kind: String = row.get(4)?;
    Ok(Artifact {
        id: ArtifactId::new(row.get::<_, String>(0)?),
        blueprint_id: BlueprintId::new(row.get::<_, String>(1)?),
        source_node_id: NodeId::new(row.get::<_, String>(2)?),
        target_node_id: row.get::<_, Option<String>>(3)?.map(NodeId::new),
        kind: ArtifactKind::parse(&kind).ok_or_else(|| bad_text("artifact kind", &kind))?,
        content: row.get(5)?,
        created_at: parse_ts(row.get(6)?)?,
    })
}

fn related_session_from_row(row: &Row<'_>) -> Result<RelatedSession, rusqlite::Error> {
    let kind: String = row.get(4)?;
    Ok(RelatedSession {
        id: row.get(0)?,
        blueprint_id: BlueprintId::new(row.get::<_, String>(1)?),
        node_id: NodeId::new(row.get::<_, String>(2)?),
        session_id: row.get(3)?,
        kind: RelatedSessionKind::parse(&kind)
            .ok_or_else(|| bad_text("related session kind", &kind))?,
        created_at: parse_ts(row.get(5)?)?,
    })
}

// ── Shared statement helpers (used by graph mutations too) ──────────────────

pub(crate) fn insert_node(conn: &Connection, node: &MacroNode) -> Result<(), StoreError> {
    let deps: Vec<&str> = node.dependencies.iter().map(|d| d.as_str()).collect();
    conn.execute(
        "INSERT INTO macro_nodes
            (id, blueprint_id, node_order, title, description, prompt, dependencies, status,
             error, agent_type, estimated_minutes, actual_minutes, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
        params![
            node.id.as_str(),
            node.blueprint_id.as_str(),
            node.node_order,
            node.title,
            node.description,
            node.prompt,
            serde_json::to_string(&deps)?,
            node.status.as_str(),
            node.error,
            node.agent_type,
            node.estimated_minutes,
            node.actual_minutes,
            fmt_ts(node.created_at),
        ],
    )?;
    Ok(())
}

pub(crate) fn update_node_row(conn: &Connection, node: &MacroNode) -> Result<(), StoreError> {
    let deps: Vec<&str> = node.dependencies.iter().map(|d| d.as_str()).collect();
    let n = conn.execute(
        "UPDATE macro_nodes
         SET node_order = ?2, title = ?3, description = ?4, prompt = ?5, dependencies = ?6,
             status = ?7, error = ?8, agent_type = ?9, estimated_minutes = ?10,
             actual_minutes = ?11
         WHERE id = ?1",
        params![
            node.id.as_str(),
            node.node_order,
            node.title,
            node.description,
            node.prompt,
            serde_json::to_string(&deps)?,
            node.status.as_str(),
            node.error,
            node.agent_type,
            node.estimated_minutes,
            node.actual_minutes,
        ],
    )?;
    if n == 0 {
        return Err(StoreError::not_found("node", node.id.as_str()));
    }
    Ok(())
}

pub(crate) fn lookup_node(conn: &Connection, id: &NodeId) -> Result<MacroNode, StoreError> {
    conn.query_row(
        &format!("{NODE_SELECT} WHERE id = ?1"),
        [id.as_str()],
        node_from_row,
    )
    .optional()?
    .ok_or_else(|| StoreError::not_found("node", id.as_str()))
}

pub(crate) fn blueprint_nodes(
    conn: &Connection,
    id: &BlueprintId,
) -> Result<Vec<MacroNode>, StoreError> {
    let mut stmt = conn.prepare(&format!(
        "{NODE_SELECT} WHERE blueprint_id = ?1 ORDER BY node_order, id"
    ))?;
    let rows = stmt
        .query_map([id.as_str()], node_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn blueprint_artifacts(conn: &Connection, id: &BlueprintId) -> Result<Vec<Artifact>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT id, blueprint_id, source_node_id, target_node_id, kind, content, created_at
         FROM artifacts WHERE blueprint_id = ?1 ORDER BY created_at",
    )?;
    let rows = stmt
        .query_map([id.as_str()], artifact_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub(crate) fn insert_execution(conn: &Connection, exec: &NodeExecution) -> Result<(), StoreError> {
    let blocker_info = exec
        .blocker_info
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?;
    conn.execute(
        "INSERT INTO node_executions
            (id, node_id, blueprint_id, session_id, kind, status, input_context,
             output_summary, cli_pid, parent_execution_id, blocker_info, task_summary,
             failure_reason, reported_status, reported_reason, compaction_count,
             peak_tokens, pressure_level, started_at, completed_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20)",
        params![
            exec.id.as_str(),
            exec.node_id.as_str(),
            exec.blueprint_id.as_str(),
            exec.session_id,
            exec.kind.as_str(),
            exec.status.as_str(),
            exec.input_context,
            exec.output_summary,
            exec.cli_pid.map(|p| p as i64),
            exec.parent_execution_id.as_ref().map(|p| p.as_str()),
            blocker_info,
            exec.task_summary,
            exec.failure_reason.as_ref().map(|f| f.as_str()),
            exec.reported_status.as_ref().map(|r| r.as_str()),
            exec.reported_reason,
            exec.context_health.compaction_count,
            exec.context_health.peak_tokens,
            exec.context_health.pressure_level,
            fmt_ts(exec.started_at),
            exec.completed_at.map(fmt_ts),
        ],
    )?;
    Ok(())
}

pub(crate) fn insert_artifact(conn: &Connection, artifact: &Artifact) -> Result<(), StoreError> {
    conn.execute(
        "INSERT INTO artifacts (id, blueprint_id, source_node_id, target_node_id, kind, content, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            artifact.id.as_str(),
            artifact.blueprint_id.as_str(),
            artifact.source_node_id.as_str(),
            artifact.target_node_id.as_ref().map(|t| t.as_str()),
            artifact.kind.as_str(),
            artifact.content,
            fmt_ts(artifact.created_at),
        ],
    )?;
    Ok(())
}

pub(crate) fn handoff_for_inner(
    conn: &Connection,
    source: &NodeId,
    target: &NodeId,
) -> Result<Option<Artifact>, StoreError> {
    let targeted = conn
        .query_row(
            "SELECT id, blueprint_id, source_node_id, target_node_id, kind, content, created_at
             FROM artifacts
             WHERE source_node_id = ?1 AND target_node_id = ?2 AND kind = 'handoff_summary'
             ORDER BY created_at DESC LIMIT 1",
            params![source.as_str(), target.as_str()],
            artifact_from_row,
        )
        .optional()?;
    if targeted.is_some() {
        return Ok(targeted);
    }

    Ok(conn
        .query_row(
            "SELECT id, blueprint_id, source_node_id, target_node_id, kind, content, created_at
             FROM artifacts
             WHERE source_node_id = ?1 AND target_node_id IS NULL AND kind = 'handoff_summary'
             ORDER BY created_at DESC LIMIT 1",
            [source.as_str()],
            artifact_from_row,
        )
        .optional()?)
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
