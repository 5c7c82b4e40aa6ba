// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn bp(id: &str) -> BlueprintId {
    BlueprintId::new(id)
}

fn node(id: &str) -> NodeId {
    NodeId::new(id)
}

#[test]
fn add_and_list_preserve_order() {
    let registry = PendingTaskRegistry::new();
    registry.add(&bp("a"), TaskType::Run, Some(node("n1")), Utc::now());
    registry.add(&bp("a"), TaskType::Run, Some(node("n2")), Utc::now());

    let tasks = registry.list(&bp("a"));
    assert_eq!(tasks.len(), 2);
    assert_eq!(tasks[0].node_id.as_ref().map(|n| n.as_str()), Some("n1"));
    assert_eq!(tasks[1].node_id.as_ref().map(|n| n.as_str()), Some("n2"));
}

#[test]
fn remove_matches_node_and_type() {
    let registry = PendingTaskRegistry::new();
    registry.add(&bp("a"), TaskType::Run, Some(node("n1")), Utc::now());
    registry.add(&bp("a"), TaskType::Reevaluate, Some(node("n1")), Utc::now());

    assert!(registry.remove(&bp("a"), Some(&node("n1")), Some(TaskType::Reevaluate)));
    let tasks = registry.list(&bp("a"));
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].task_type, TaskType::Run);
}

#[test]
fn nil_fields_are_wildcards() {
    let registry = PendingTaskRegistry::new();
    registry.add(&bp("a"), TaskType::Run, Some(node("n1")), Utc::now());
    registry.add(&bp("a"), TaskType::Run, Some(node("n2")), Utc::now());

    // wildcard node: removes the first entry
    assert!(registry.remove(&bp("a"), None, Some(TaskType::Run)));
    let tasks = registry.list(&bp("a"));
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].node_id.as_ref().map(|n| n.as_str()), Some("n2"));
}

#[test]
fn removing_last_entry_deletes_the_key() {
    let registry = PendingTaskRegistry::new();
    registry.add(&bp("a"), TaskType::Run, Some(node("n1")), Utc::now());

    assert!(registry.has_any(&bp("a")));
    registry.remove(&bp("a"), Some(&node("n1")), None);
    assert!(!registry.has_any(&bp("a")));
    assert!(registry.list(&bp("a")).is_empty());
}

#[test]
fn removal_is_idempotent() {
    let registry = PendingTaskRegistry::new();
    assert!(!registry.remove(&bp("ghost"), None, None));
    registry.add(&bp("a"), TaskType::Run, Some(node("n1")), Utc::now());
    assert!(registry.remove(&bp("a"), Some(&node("n1")), None));
    assert!(!registry.remove(&bp("a"), Some(&node("n1")), None));
}

#[test]
fn contains_checks_membership() {
    let registry = PendingTaskRegistry::new();
    registry.add(&bp("a"), TaskType::Run, Some(node("n1")), Utc::now());

    assert!(registry.contains(&bp("a"), Some(&node("n1")), Some(TaskType::Run)));
    assert!(registry.contains(&bp("a"), None, None));
    assert!(!registry.contains(&bp("a"), Some(&node("n2")), None));
    assert!(!registry.contains(&bp("b"), None, None));
}

#[test]
fn list_all_flattens_across_blueprints() {
    let registry = PendingTaskRegistry::new();
    let t0 = Utc::now();
    registry.add(&bp("a"), TaskType::Run, Some(node("n1")), t0);
    registry.add(&bp("b"), TaskType::RunAll, None, t0 + chrono::TimeDelta::seconds(1));

    let all = registry.list_all();
    assert_eq!(all.len(), 2);
    assert_eq!(all[0].0.as_str(), "a");
    assert_eq!(all[1].0.as_str(), "b");
}
