// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use fm_core::test_support::{blueprint, execution, node, node_with_status, t0};
use fm_core::{ArtifactKind, NodeStatus};

fn store_with_blueprint(id: &str) -> Store {
    let store = Store::open_in_memory().unwrap();
    store.create_blueprint(&blueprint(id, "Test plan")).unwrap();
    store
}

#[test]
fn blueprint_roundtrip() {
    let store = store_with_blueprint("bp");
    let loaded = store.blueprint(&BlueprintId::new("bp")).unwrap();
    assert_eq!(loaded.title, "Test plan");
    assert_eq!(loaded.status, BlueprintStatus::Approved);
    assert_eq!(loaded.project_dir, Some(PathBuf::from("/test/project")));
}

#[test]
fn missing_blueprint_is_not_found() {
    let store = Store::open_in_memory().unwrap();
    let err = store.blueprint(&BlueprintId::new("nope")).unwrap_err();
    assert!(err.is_not_found());
}

#[test]
fn node_roundtrip_preserves_dependencies() {
    let store = store_with_blueprint("bp");
    store.create_node(&node("a", "bp", &[])).unwrap();
    store.create_node(&node("b", "bp", &["a"])).unwrap();

    let loaded = store.node(&NodeId::new("b")).unwrap();
    assert_eq!(loaded.dependencies, vec![NodeId::new("a")]);
    assert_eq!(loaded.status, NodeStatus::Pending);
}

#[test]
fn conditional_status_flip_only_touches_matching_rows() {
    let store = store_with_blueprint("bp");
    store
        .create_node(&node_with_status("a", "bp", &[], NodeStatus::Queued))
        .unwrap();

    // queued → pending applies
    assert!(store
        .set_node_status_if(&NodeId::new("a"), NodeStatus::Queued, NodeStatus::Pending)
        .unwrap());

    // second run is a no-op: the row is no longer queued
    assert!(!store
        .set_node_status_if(&NodeId::new("a"), NodeStatus::Queued, NodeStatus::Pending)
        .unwrap());
    assert_eq!(
        store.node(&NodeId::new("a")).unwrap().status,
        NodeStatus::Pending
    );
}

#[test]
fn latest_running_execution_keys_callbacks() {
    let store = store_with_blueprint("bp");
    store.create_node(&node("a", "bp", &[])).unwrap();

    let mut first = execution("e1", "a", "bp", t0());
    first.status = ExecutionStatus::Failed;
    store.create_execution(&first).unwrap();

    let second = execution("e2", "a", "bp", t0() + chrono::TimeDelta::seconds(60));
    store.create_execution(&second).unwrap();

    let running = store
        .latest_running_execution(&NodeId::new("a"))
        .unwrap()
        .unwrap();
    assert_eq!(running.id.as_str(), "e2");
}

#[test]
fn finish_execution_flips_node_and_writes_artifacts_atomically() {
    let store = store_with_blueprint("bp");
    store.create_node(&node("a", "bp", &[])).unwrap();
    store.create_node(&node("b", "bp", &["a"])).unwrap();
    store.create_execution(&execution("e1", "a", "bp", t0())).unwrap();

    let artifact = fm_core::Artifact {
        id: fm_core::ArtifactId::new("art-1"),
        blueprint_id: BlueprintId::new("bp"),
        source_node_id: NodeId::new("a"),
        target_node_id: Some(NodeId::new("b")),
        kind: ArtifactKind::HandoffSummary,
        content: "built the parser".to_string(),
        created_at: t0(),
    };

    store
        .finish_execution(ExecutionFinish {
            execution_id: ExecutionId::new("e1"),
            execution_status: ExecutionStatus::Done,
            output_summary: Some("built the parser".to_string()),
            failure_reason: None,
            session_id: Some("sess-123".to_string()),
            node_status: Some(NodeStatus::Done),
            node_error: None,
            actual_minutes: Some(3),
            artifacts: vec![artifact],
            completed_at: t0() + chrono::TimeDelta::seconds(180),
        })
        .unwrap();

    let exec = store.execution(&ExecutionId::new("e1")).unwrap();
    assert_eq!(exec.status, ExecutionStatus::Done);
    assert_eq!(exec.session_id.as_deref(), Some("sess-123"));
    assert!(exec.completed_at.is_some());

    let node = store.node(&NodeId::new("a")).unwrap();
    assert_eq!(node.status, NodeStatus::Done);
    assert_eq!(node.actual_minutes, Some(3));

    let handoff = store
        .handoff_for(&NodeId::new("a"), &NodeId::new("b"))
        .unwrap()
        .unwrap();
    assert_eq!(handoff.content, "built the parser");
    assert!(handoff.is_targeted());
}

#[test]
fn finish_execution_keeps_existing_session_id() {
    let store = store_with_blueprint("bp");
    store.create_node(&node("a", "bp", &[])).unwrap();
    store.create_execution(&execution("e1", "a", "bp", t0())).unwrap();
    store
        .set_execution_session(&ExecutionId::new("e1"), "original")
        .unwrap();

    store
        .finish_execution(ExecutionFinish {
            execution_id: ExecutionId::new("e1"),
            execution_status: ExecutionStatus::Done,
            output_summary: None,
            failure_reason: None,
            session_id: Some("late-detection".to_string()),
            node_status: Some(NodeStatus::Done),
            node_error: None,
            actual_minutes: None,
            artifacts: vec![],
            completed_at: t0(),
        })
        .unwrap();

    let exec = store.execution(&ExecutionId::new("e1")).unwrap();
    assert_eq!(exec.session_id.as_deref(), Some("original"));
}

#[test]
fn handoff_prefers_targeted_over_untargeted() {
    let store = store_with_blueprint("bp");
    store.create_node(&node("a", "bp", &[])).unwrap();
    store.create_node(&node("b", "bp", &["a"])).unwrap();

    let untargeted = fm_core::Artifact {
        id: fm_core::ArtifactId::new("art-u"),
        blueprint_id: BlueprintId::new("bp"),
        source_node_id: NodeId::new("a"),
        target_node_id: None,
        kind: ArtifactKind::HandoffSummary,
        content: "untargeted".to_string(),
        created_at: t0(),
    };
    store.create_artifact(&untargeted).unwrap();

    // only the untargeted one exists: adopted on demand
    let adopted = store
        .handoff_for(&NodeId::new("a"), &NodeId::new("b"))
        .unwrap()
        .unwrap();
    assert_eq!(adopted.content, "untargeted");

    let targeted = fm_core::Artifact {
        id: fm_core::ArtifactId::new("art-t"),
        blueprint_id: BlueprintId::new("bp"),
        source_node_id: NodeId::new("a"),
        target_node_id: Some(NodeId::new("b")),
        kind: ArtifactKind::HandoffSummary,
        content: "targeted".to_string(),
        created_at: t0() + chrono::TimeDelta::seconds(5),
    };
    store.create_artifact(&targeted).unwrap();

    let preferred = store
        .handoff_for(&NodeId::new("a"), &NodeId::new("b"))
        .unwrap()
        .unwrap();
    assert_eq!(preferred.content, "targeted");
}

#[test]
fn running_executions_joins_project_dir() {
    let store = store_with_blueprint("bp");
    store.create_node(&node("a", "bp", &[])).unwrap();
    store.create_execution(&execution("e1", "a", "bp", t0())).unwrap();

    let running = store.running_executions().unwrap();
    assert_eq!(running.len(), 1);
    assert_eq!(running[0].0.id.as_str(), "e1");
    assert_eq!(running[0].1, Some(PathBuf::from("/test/project")));
}

#[test]
fn queued_nodes_query_finds_orphans() {
    let store = store_with_blueprint("bp");
    store
        .create_node(&node_with_status("a", "bp", &[], NodeStatus::Queued))
        .unwrap();
    store
        .create_node(&node_with_status("b", "bp", &[], NodeStatus::Running))
        .unwrap();

    let queued = store.queued_nodes().unwrap();
    assert_eq!(queued.len(), 1);
    assert_eq!(queued[0].id.as_str(), "a");
}

#[test]
fn session_owner_reports_existing_assignment() {
    let store = store_with_blueprint("bp");
    store.create_node(&node("a", "bp", &[])).unwrap();
    store.create_execution(&execution("e1", "a", "bp", t0())).unwrap();
    store
        .set_execution_session(&ExecutionId::new("e1"), "sess-9")
        .unwrap();

    assert_eq!(
        store.session_owner("sess-9").unwrap(),
        Some(ExecutionId::new("e1"))
    );
    assert_eq!(store.session_owner("sess-other").unwrap(), None);
}

#[test]
fn failed_executions_since_matches_marker_and_cutoff() {
    let store = store_with_blueprint("bp");
    store.create_node(&node("a", "bp", &[])).unwrap();
    store.create_execution(&execution("e1", "a", "bp", t0())).unwrap();
    store
        .finish_execution(ExecutionFinish {
            execution_id: ExecutionId::new("e1"),
            execution_status: ExecutionStatus::Failed,
            output_summary: Some("Server restarted while execution was running".to_string()),
            failure_reason: Some(fm_core::FailureReason::Error),
            session_id: None,
            node_status: Some(NodeStatus::Failed),
            node_error: None,
            actual_minutes: None,
            artifacts: vec![],
            completed_at: t0(),
        })
        .unwrap();

    let hits = store
        .failed_executions_since(t0() - chrono::TimeDelta::minutes(10), "Server restarted")
        .unwrap();
    assert_eq!(hits.len(), 1);

    let later_cutoff = store
        .failed_executions_since(t0() + chrono::TimeDelta::minutes(1), "Server restarted")
        .unwrap();
    assert!(later_cutoff.is_empty());
}

#[test]
fn revert_execution_to_running_restores_both_rows() {
    let store = store_with_blueprint("bp");
    store.create_node(&node("a", "bp", &[])).unwrap();
    store.create_execution(&execution("e1", "a", "bp", t0())).unwrap();
    store
        .finish_execution(ExecutionFinish {
            execution_id: ExecutionId::new("e1"),
            execution_status: ExecutionStatus::Failed,
            output_summary: Some("Server restarted while execution was running".to_string()),
            failure_reason: Some(fm_core::FailureReason::Error),
            session_id: Some("sess-1".to_string()),
            node_status: Some(NodeStatus::Failed),
            node_error: Some("Execution interrupted by server restart".to_string()),
            actual_minutes: None,
            artifacts: vec![],
            completed_at: t0(),
        })
        .unwrap();

    store
        .revert_execution_to_running(&ExecutionId::new("e1"))
        .unwrap();

    let exec = store.execution(&ExecutionId::new("e1")).unwrap();
    assert_eq!(exec.status, ExecutionStatus::Running);
    assert!(exec.completed_at.is_none());
    assert!(exec.failure_reason.is_none());
    // session assignment survives the reversion
    assert_eq!(exec.session_id.as_deref(), Some("sess-1"));

    let node = store.node(&NodeId::new("a")).unwrap();
    assert_eq!(node.status, NodeStatus::Running);
    assert!(node.error.is_none());
}

#[test]
fn load_blueprint_graph_returns_full_picture() {
    let store = store_with_blueprint("bp");
    store.create_node(&node("a", "bp", &[])).unwrap();
    store.create_node(&node("b", "bp", &["a"])).unwrap();
    store.create_execution(&execution("e1", "a", "bp", t0())).unwrap();

    let graph = store.load_blueprint_graph(&BlueprintId::new("bp")).unwrap();
    assert_eq!(graph.blueprint.id.as_str(), "bp");
    assert_eq!(graph.nodes.len(), 2);
    assert_eq!(graph.executions.len(), 1);
    assert!(graph.artifacts.is_empty());
}

#[test]
fn deleting_blueprint_cascades() {
    let store = store_with_blueprint("bp");
    store.create_node(&node("a", "bp", &[])).unwrap();
    store.create_execution(&execution("e1", "a", "bp", t0())).unwrap();

    store.delete_blueprint(&BlueprintId::new("bp")).unwrap();
    assert!(store.node(&NodeId::new("a")).unwrap_err().is_not_found());
    assert!(store
        .execution(&ExecutionId::new("e1"))
        .unwrap_err()
        .is_not_found());
}

#[test]
fn store_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.db");
    {
        let store = Store::open(&path).unwrap();
        store.create_blueprint(&blueprint("bp", "Persisted")).unwrap();
        store.create_node(&node("a", "bp", &[])).unwrap();
    }
    let store = Store::open(&path).unwrap();
    assert_eq!(store.blueprint(&BlueprintId::new("bp")).unwrap().title, "Persisted");
    assert_eq!(store.node(&NodeId::new("a")).unwrap().id.as_str(), "a");
}
