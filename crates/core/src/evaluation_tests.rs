// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn parse(json: &str) -> serde_json::Result<EvaluationBody> {
    serde_json::from_str(json)
}

#[test]
fn complete_body_parses() {
    let body = parse(r#"{"status": "COMPLETE", "evaluation": "all good"}"#).unwrap();
    assert_eq!(body.status, EvaluationStatus::Complete);
    assert_eq!(body.evaluation, "all good");
    assert!(body.valid_mutations().is_empty());
}

#[test]
fn unknown_status_rejects_body() {
    assert!(parse(r#"{"status": "PARTIAL"}"#).is_err());
    assert!(parse(r#"{"status": 7}"#).is_err());
    assert!(parse(r#"{}"#).is_err());
}

#[test]
fn refinement_mutation_survives_sanitization() {
    let body = parse(
        r#"{
            "status": "NEEDS_REFINEMENT",
            "evaluation": "validation is too loose",
            "mutations": [
                {"action": "INSERT_BETWEEN", "new_node": {"title": "Fix validation", "description": "Tighten checks"}}
            ]
        }"#,
    )
    .unwrap();

    let mutations = body.valid_mutations();
    assert_eq!(mutations.len(), 1);
    assert_eq!(mutations[0].action, MutationAction::InsertBetween);
    assert_eq!(mutations[0].new_node.title, "Fix validation");
}

#[test]
fn malformed_mutations_are_discarded_individually() {
    let body = parse(
        r#"{
            "status": "HAS_BLOCKER",
            "mutations": [
                {"action": "ADD_SIBLING", "new_node": {"title": "Wait AWS creds"}},
                {"action": "ADD_SIBLING", "new_node": {"title": "   "}},
                {"action": "EXPLODE", "new_node": {"title": "nope"}},
                {"new_node": {"title": "no action"}},
                {"action": "ADD_SIBLING"}
            ]
        }"#,
    )
    .unwrap();

    let mutations = body.valid_mutations();
    assert_eq!(mutations.len(), 1);
    assert_eq!(mutations[0].new_node.title, "Wait AWS creds");
    assert_eq!(mutations[0].new_node.description, "");
}

#[test]
fn node_update_blocks_executor_owned_statuses() {
    let writable = NodeUpdate {
        status: Some(NodeStatus::Skipped),
        ..Default::default()
    };
    assert!(writable.status_is_writable());

    let queued = NodeUpdate {
        status: Some(NodeStatus::Queued),
        ..Default::default()
    };
    assert!(!queued.status_is_writable());

    let running = NodeUpdate {
        status: Some(NodeStatus::Running),
        ..Default::default()
    };
    assert!(!running.status_is_writable());
}
