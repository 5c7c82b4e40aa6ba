//! Scenarios: crash during a run, orphan re-enqueue, idempotent recovery.

use crate::prelude::*;
use fm_core::test_support::{execution, node_with_status};
use fm_core::{ExecutionId, ExecutionStatus, NodeId, NodeStatus};
use std::time::Duration;

/// Scenario 4a: process died mid-run but the session file exists →
/// finalize to done with the synthetic summary.
#[tokio::test]
async fn crash_with_session_file_finalizes() {
    let w = world();
    w.seed_blueprint("bp", "Plan");
    let mut n = node_with_status("a", "bp", &[], NodeStatus::Running);
    n.node_order = 0;
    w.store.create_node(&n).unwrap();
    w.store
        .create_execution(&execution("e1", "a", "bp", w.clock.now()))
        .unwrap();

    w.clock.advance(Duration::from_secs(300));
    w.fake.push_detected_session(Some("sess-after-crash"));

    let report = w.recovery.run_startup().await;
    assert_eq!(report.finalized, 1);

    let exec = w.store.execution(&ExecutionId::new("e1")).unwrap();
    assert_eq!(exec.status, ExecutionStatus::Done);
    assert_eq!(
        exec.output_summary.as_deref(),
        Some("Recovered after server restart")
    );
    assert_eq!(exec.session_id.as_deref(), Some("sess-after-crash"));

    let node = w.store.node(&NodeId::new("a")).unwrap();
    assert_eq!(node.status, NodeStatus::Done);
    assert_eq!(node.actual_minutes, Some(5));
}

/// Scenario 4b: no session file → fail with the restart message.
#[tokio::test]
async fn crash_without_session_file_fails() {
    let w = world();
    w.seed_blueprint("bp", "Plan");
    w.store
        .create_node(&node_with_status("a", "bp", &[], NodeStatus::Running))
        .unwrap();
    w.store
        .create_execution(&execution("e1", "a", "bp", w.clock.now()))
        .unwrap();

    let report = w.recovery.run_startup().await;
    assert_eq!(report.failed, 1);

    let exec = w.store.execution(&ExecutionId::new("e1")).unwrap();
    assert_eq!(exec.status, ExecutionStatus::Failed);
    assert_eq!(
        exec.output_summary.as_deref(),
        Some("Server restarted while execution was running")
    );
    assert_eq!(
        w.store.node(&NodeId::new("a")).unwrap().error.as_deref(),
        Some("Execution interrupted by server restart")
    );
}

/// Scenario 5: nodes x,y,z left queued; recovery re-enqueues them; y's
/// failure resets only still-queued rows back to pending.
#[tokio::test]
async fn orphan_re_enqueue_with_partial_failure() {
    let w = world();
    w.seed_blueprint("bp", "Plan");
    for (id, order) in [("x", 0), ("y", 1), ("z", 2)] {
        let mut n = node_with_status(id, "bp", &[], NodeStatus::Queued);
        n.node_order = order;
        w.store.create_node(&n).unwrap();
    }

    w.fake.push_stdout(COMPLETE_STDOUT); // x succeeds
    w.fake.push_stdout("hm"); // y hangs

    let report = w.recovery.run_startup().await;
    assert_eq!(report.re_enqueued, 3);

    while !w.driver.queue().is_idle() {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    assert_eq!(w.store.node(&NodeId::new("x")).unwrap().status, NodeStatus::Done);
    assert_eq!(w.store.node(&NodeId::new("y")).unwrap().status, NodeStatus::Failed);
    assert_eq!(w.store.node(&NodeId::new("z")).unwrap().status, NodeStatus::Pending);
}

/// Property 5: running recovery twice yields the same state as once.
#[tokio::test]
async fn recovery_is_idempotent() {
    let w = world();
    w.seed_blueprint("bp", "Plan");
    w.store
        .create_node(&node_with_status("a", "bp", &[], NodeStatus::Queued))
        .unwrap();

    // gate the drainer so nothing executes between the passes
    let (gate_tx, gate_rx) = tokio::sync::oneshot::channel::<()>();
    w.driver.queue().enqueue(
        &fm_core::BlueprintId::new("bp"),
        fm_engine::TaskType::Run,
        None,
        w.clock.now(),
        Box::new(move || {
            Box::pin(async move {
                let _ = gate_rx.await;
                fm_engine::TaskOutcome::Completed(None)
            })
        }),
    );

    let first = w.recovery.run_startup().await;
    let second = w.recovery.run_startup().await;
    assert_eq!(first.re_enqueued, 1);
    assert_eq!(second.re_enqueued, 0);

    let _ = gate_tx.send(());
}

/// Property 7: recovery never reassigns a session another execution owns.
#[tokio::test]
async fn no_session_theft() {
    let w = world();
    w.seed_blueprint("bp", "Plan");
    w.store
        .create_node(&node_with_status("a", "bp", &[], NodeStatus::Done))
        .unwrap();
    w.store
        .create_node(&node_with_status("b", "bp", &[], NodeStatus::Running))
        .unwrap();

    let mut owner = execution("e-owner", "a", "bp", w.clock.now());
    owner.status = ExecutionStatus::Done;
    owner.session_id = Some("sess-shared".to_string());
    w.store.create_execution(&owner).unwrap();
    w.store
        .create_execution(&execution("e-stale", "b", "bp", w.clock.now()))
        .unwrap();

    w.fake.push_detected_session(Some("sess-shared"));
    w.recovery.run_startup().await;

    let stale = w.store.execution(&ExecutionId::new("e-stale")).unwrap();
    assert!(stale.session_id.is_none());
    assert_eq!(
        w.store
            .execution(&ExecutionId::new("e-owner"))
            .unwrap()
            .session_id
            .as_deref(),
        Some("sess-shared")
    );
}
