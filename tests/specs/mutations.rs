//! Scenarios: INSERT_BETWEEN refinement and ADD_SIBLING blockers.

use crate::prelude::*;
use fm_core::{BlueprintId, EvaluationBody, NodeId, NodeStatus};

fn evaluation(json: &str) -> EvaluationBody {
    serde_json::from_str(json).unwrap()
}

/// Scenario 2: n0(done) → n1(pending) → n2(pending); running n1 yields
/// NEEDS_REFINEMENT with an INSERT_BETWEEN mutation.
#[tokio::test]
async fn insert_between_rewires_the_graph() {
    let w = world();
    w.seed_blueprint("bp", "Plan");
    let mut n0 = fm_core::test_support::node_with_status("n0", "bp", &[], NodeStatus::Done);
    n0.node_order = 0;
    w.store.create_node(&n0).unwrap();
    w.seed_node("n1", "bp", &["n0"], 1);
    w.seed_node("n2", "bp", &["n1"], 2);

    let inbox = w.driver.inbox().clone();
    w.fake.set_run_hook(move |_req| {
        inbox.push(
            &NodeId::new("n1"),
            evaluation(
                r#"{"status": "NEEDS_REFINEMENT",
                    "evaluation": "validation needs tightening",
                    "mutations": [{"action": "INSERT_BETWEEN",
                                   "new_node": {"title": "Fix validation"}}]}"#,
            ),
        );
    });
    w.fake.push_stdout(COMPLETE_STDOUT);

    let outcome = w.driver.run_node(&NodeId::new("n1")).unwrap().await.unwrap();
    assert!(outcome.is_done());

    // n1 stays done
    assert_eq!(
        w.store.node(&NodeId::new("n1")).unwrap().status,
        NodeStatus::Done
    );

    // the refinement node exists, pending, depending on n1
    let nodes = w.store.nodes_for_blueprint(&BlueprintId::new("bp")).unwrap();
    let refinement = nodes.iter().find(|n| n.title == "Fix validation").unwrap();
    assert_eq!(refinement.status, NodeStatus::Pending);
    assert_eq!(refinement.dependencies, vec![NodeId::new("n1")]);

    // n2 now depends on the refinement instead of n1
    let n2 = w.store.node(&NodeId::new("n2")).unwrap();
    assert_eq!(n2.dependencies, vec![refinement.id.clone()]);

    // running n2 before the refinement completes is rejected
    let err = w.driver.run_node(&NodeId::new("n2")).unwrap_err();
    assert!(err.to_string().contains("Fix validation"));
}

/// Scenario 3: HAS_BLOCKER adds a blocked sibling that gates dependents
/// until a user resolves it.
#[tokio::test]
async fn add_sibling_blocker_gates_dependents() {
    let w = world();
    w.seed_blueprint("bp", "Plan");
    let mut n0 = fm_core::test_support::node_with_status("n0", "bp", &[], NodeStatus::Done);
    n0.node_order = 0;
    w.store.create_node(&n0).unwrap();
    w.seed_node("n1", "bp", &["n0"], 1);
    w.seed_node("n2", "bp", &["n1"], 2);

    let inbox = w.driver.inbox().clone();
    w.fake.set_run_hook(move |_req| {
        inbox.push(
            &NodeId::new("n1"),
            evaluation(
                r#"{"status": "HAS_BLOCKER",
                    "mutations": [{"action": "ADD_SIBLING",
                                   "new_node": {"title": "Wait AWS creds"}}]}"#,
            ),
        );
    });
    w.fake.push_stdout(COMPLETE_STDOUT);

    w.driver.run_node(&NodeId::new("n1")).unwrap().await.unwrap();

    let nodes = w.store.nodes_for_blueprint(&BlueprintId::new("bp")).unwrap();
    let blocker = nodes.iter().find(|n| n.title == "Wait AWS creds").unwrap();
    assert_eq!(blocker.status, NodeStatus::Blocked);

    let n2 = w.store.node(&NodeId::new("n2")).unwrap();
    assert!(n2.depends_on(&NodeId::new("n1")));
    assert!(n2.depends_on(&blocker.id));

    // gated while the blocker stands
    assert!(w.driver.run_node(&NodeId::new("n2")).is_err());

    // a user resolves the blocker: n2 becomes runnable
    w.store
        .set_node_status(&blocker.id, NodeStatus::Skipped, None)
        .unwrap();
    w.fake.push_stdout(COMPLETE_STDOUT);
    let outcome = w.driver.run_node(&NodeId::new("n2")).unwrap().await.unwrap();
    assert!(outcome.is_done());
}

/// Property 8 (SPLIT): replace a pending node with a chain; dependents
/// re-point at the tail and the original is skipped.
#[tokio::test]
async fn split_replaces_pending_node_with_chain() {
    let w = world();
    w.seed_blueprint("bp", "Plan");
    w.seed_node("root", "bp", &[], 0);
    w.seed_node("big", "bp", &["root"], 1);
    w.seed_node("tail", "bp", &["big"], 2);

    let specs = vec![
        fm_core::NewNodeSpec {
            title: "first piece".to_string(),
            description: String::new(),
        },
        fm_core::NewNodeSpec {
            title: "second piece".to_string(),
            description: String::new(),
        },
    ];
    let outcome = w.driver.split_node(&NodeId::new("big"), &specs).unwrap();
    assert_eq!(outcome.chain.len(), 2);

    assert_eq!(
        w.store.node(&NodeId::new("big")).unwrap().status,
        NodeStatus::Skipped
    );
    assert_eq!(
        outcome.chain[0].dependencies,
        vec![NodeId::new("root")]
    );
    assert_eq!(
        outcome.chain[1].dependencies,
        vec![outcome.chain[0].id.clone()]
    );
    assert_eq!(
        w.store.node(&NodeId::new("tail")).unwrap().dependencies,
        vec![outcome.chain[1].id.clone()]
    );
}
