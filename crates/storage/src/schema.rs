// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! SQLite schema for the executor store

use crate::StoreError;
use rusqlite::Connection;

/// Schema version (increment when changing table definitions)
pub const SCHEMA_VERSION: i32 = 1;

pub fn init_schema(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;

    let current_version: i32 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
    if current_version != 0 && current_version != SCHEMA_VERSION {
        return Err(StoreError::Constraint(format!(
            "database schema version {} is newer than supported version {}",
            current_version, SCHEMA_VERSION
        )));
    }

    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS blueprints (
            id TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            description TEXT,
            project_dir TEXT,
            agent_type TEXT,
            status TEXT NOT NULL,
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS macro_nodes (
            id TEXT PRIMARY KEY,
            blueprint_id TEXT NOT NULL,
            node_order INTEGER NOT NULL,
            title TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            prompt TEXT,
            dependencies TEXT NOT NULL DEFAULT '[]',
            status TEXT NOT NULL,
            error TEXT,
            agent_type TEXT,
            estimated_minutes INTEGER,
            actual_minutes INTEGER,
            created_at TEXT NOT NULL,
            FOREIGN KEY (blueprint_id) REFERENCES blueprints(id) ON DELETE CASCADE
        );

        CREATE TABLE IF NOT EXISTS artifacts (
            id TEXT PRIMARY KEY,
            blueprint_id TEXT NOT NULL,
            source_node_id TEXT NOT NULL,
            target_node_id TEXT,
            kind TEXT NOT NULL,
            content TEXT NOT NULL,
            created_at TEXT NOT NULL,
            FOREIGN KEY (blueprint_id) REFERENCES blueprints(id) ON DELETE CASCADE,
            FOREIGN KEY (source_node_id) REFERENCES macro_nodes(id) ON DELETE CASCADE
        );

        CREATE TABLE IF NOT EXISTS node_executions (
            id TEXT PRIMARY KEY,
            node_id TEXT NOT NULL,
            blueprint_id TEXT NOT NULL,
            session_id TEXT,
            kind TEXT NOT NULL,
            status TEXT NOT NULL,
            input_context TEXT NOT NULL DEFAULT '',
            output_summary TEXT,
            cli_pid INTEGER,
            parent_execution_id TEXT,
            blocker_info TEXT,
            task_summary TEXT,
            failure_reason TEXT,
            reported_status TEXT,
            reported_reason TEXT,
            compaction_count INTEGER NOT NULL DEFAULT 0,
            peak_tokens INTEGER,
            pressure_level TEXT,
            started_at TEXT NOT NULL,
            completed_at TEXT,
            FOREIGN KEY (node_id) REFERENCES macro_nodes(id) ON DELETE CASCADE,
            FOREIGN KEY (blueprint_id) REFERENCES blueprints(id) ON DELETE CASCADE
        );

        CREATE TABLE IF NOT EXISTS related_sessions (
            id TEXT PRIMARY KEY,
            blueprint_id TEXT NOT NULL,
            node_id TEXT NOT NULL,
            session_id TEXT NOT NULL,
            kind TEXT NOT NULL,
            created_at TEXT NOT NULL,
            FOREIGN KEY (node_id) REFERENCES macro_nodes(id) ON DELETE CASCADE
        );

        CREATE INDEX IF NOT EXISTS idx_nodes_blueprint ON macro_nodes(blueprint_id, node_order);
        CREATE INDEX IF NOT EXISTS idx_nodes_status ON macro_nodes(status);
        CREATE INDEX IF NOT EXISTS idx_artifacts_blueprint ON artifacts(blueprint_id);
        CREATE INDEX IF NOT EXISTS idx_artifacts_source ON artifacts(source_node_id, created_at DESC);
        CREATE INDEX IF NOT EXISTS idx_executions_node ON node_executions(node_id, started_at DESC);
        CREATE INDEX IF NOT EXISTS idx_executions_status ON node_executions(status);
        CREATE INDEX IF NOT EXISTS idx_related_sessions_node ON related_sessions(node_id);
        "#,
    )?;

    conn.execute(&format!("PRAGMA user_version = {}", SCHEMA_VERSION), [])?;

    Ok(())
}
