//! Scenario: serial within a blueprint, parallel across blueprints.

use crate::prelude::*;
use fm_adapters::AgentCall;
use fm_core::{BlueprintId, BlueprintStatus, NodeStatus};

/// Linear chain in bp-A plus a one-node bp-B, run-all on both concurrently.
/// a1 starts before a2; both blueprints finish done.
#[tokio::test]
async fn linear_chain_with_parallel_blueprint() {
    let w = world();
    w.seed_blueprint("bp-A", "Plan A");
    w.seed_node("a1", "bp-A", &[], 0);
    w.seed_node("a2", "bp-A", &["a1"], 1);
    w.seed_blueprint("bp-B", "Plan B");
    w.seed_node("b1", "bp-B", &[], 0);

    for _ in 0..3 {
        w.fake.push_stdout(COMPLETE_STDOUT);
    }

    let handles_a = w.driver.run_all(&BlueprintId::new("bp-A")).unwrap();
    let handles_b = w.driver.run_all(&BlueprintId::new("bp-B")).unwrap();
    assert_eq!(handles_a.len(), 2);
    assert_eq!(handles_b.len(), 1);

    for (_, handle) in handles_a.into_iter().chain(handles_b) {
        assert!(handle.await.unwrap().is_done());
    }

    // Queue position conservation: a1's run precedes a2's run
    let runs: Vec<String> = w
        .fake
        .calls()
        .into_iter()
        .filter_map(|c| match c {
            AgentCall::Run { prompt, .. } => Some(prompt),
            _ => None,
        })
        .collect();
    let a1_pos = runs.iter().position(|p| p.contains("step a1")).unwrap();
    let a2_pos = runs.iter().position(|p| p.contains("step a2")).unwrap();
    assert!(a1_pos < a2_pos);

    // a2's prompt carries a1's handoff
    assert!(runs[a2_pos].contains("step finished"));

    for (bp, nodes) in [("bp-A", vec!["a1", "a2"]), ("bp-B", vec!["b1"])] {
        for n in nodes {
            assert_eq!(
                w.store.node(&fm_core::NodeId::new(n)).unwrap().status,
                NodeStatus::Done
            );
        }
        assert_eq!(
            w.store.blueprint(&BlueprintId::new(bp)).unwrap().status,
            BlueprintStatus::Done
        );
    }
}

/// Property: at most one execution per blueprint is running at any instant.
#[tokio::test]
async fn one_running_execution_per_blueprint() {
    let w = world();
    w.seed_blueprint("bp", "Plan");
    w.seed_node("n1", "bp", &[], 0);
    w.seed_node("n2", "bp", &[], 1);

    // Every run checks that it is the only running execution in the store
    let store = w.store.clone();
    w.fake.set_run_hook(move |_req| {
        let running = store.running_executions().unwrap();
        assert_eq!(running.len(), 1, "two executions running concurrently");
    });
    w.fake.push_stdout(COMPLETE_STDOUT);
    w.fake.push_stdout(COMPLETE_STDOUT);

    let handles = w.driver.run_all(&BlueprintId::new("bp")).unwrap();
    for (_, handle) in handles {
        assert!(handle.await.unwrap().is_done());
    }
}

/// Property: strict dependency check when a node starts running.
#[tokio::test]
async fn running_nodes_always_have_satisfied_dependencies() {
    let w = world();
    w.seed_blueprint("bp", "Plan");
    w.seed_node("dep", "bp", &[], 0);
    w.seed_node("late", "bp", &["dep"], 1);

    // single-node run of `late` is rejected while dep is pending
    let err = w.driver.run_node(&fm_core::NodeId::new("late")).unwrap_err();
    assert!(err.to_string().contains("step dep"));

    // lenient admission: run-all happily queues both
    w.fake.push_stdout(COMPLETE_STDOUT);
    w.fake.push_stdout(COMPLETE_STDOUT);
    let handles = w.driver.run_all(&BlueprintId::new("bp")).unwrap();
    assert_eq!(handles.len(), 2);
    for (_, handle) in handles {
        assert!(handle.await.unwrap().is_done());
    }
}

/// Lenient admission never admits through failed or blocked dependencies.
#[tokio::test]
async fn run_all_excludes_nodes_behind_failures() {
    let w = world();
    w.seed_blueprint("bp", "Plan");
    let mut failed = fm_core::test_support::node_with_status("bad", "bp", &[], NodeStatus::Failed);
    failed.node_order = 0;
    w.store.create_node(&failed).unwrap();
    w.seed_node("child", "bp", &["bad"], 1);
    w.seed_node("free", "bp", &[], 2);

    w.fake.push_stdout(COMPLETE_STDOUT);
    let handles = w.driver.run_all(&BlueprintId::new("bp")).unwrap();

    // only `free` is admissible
    let queued: Vec<&str> = handles.iter().map(|(id, _)| id.as_str()).collect();
    assert_eq!(queued, vec!["free"]);
    for (_, handle) in handles {
        assert!(handle.await.unwrap().is_done());
    }
    assert_eq!(
        w.store.node(&fm_core::NodeId::new("child")).unwrap().status,
        NodeStatus::Pending
    );
}
