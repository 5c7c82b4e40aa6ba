//! Property: artifact availability between dependent nodes.

use crate::prelude::*;
use fm_core::{BlueprintId, NodeId};

/// Every done dependency of a done node has exactly one handoff reaching it:
/// targeted, or adopted from the latest untargeted output.
#[tokio::test]
async fn dependents_receive_exactly_one_handoff() {
    let w = world();
    w.seed_blueprint("bp", "Plan");
    w.seed_node("a", "bp", &[], 0);
    w.seed_node("b", "bp", &["a"], 1);

    w.fake.push_stdout(COMPLETE_STDOUT);
    w.fake.push_stdout(COMPLETE_STDOUT);
    let handles = w.driver.run_all(&BlueprintId::new("bp")).unwrap();
    for (_, handle) in handles {
        assert!(handle.await.unwrap().is_done());
    }

    let artifacts = w.store.artifacts_for_blueprint(&BlueprintId::new("bp")).unwrap();
    let to_b: Vec<_> = artifacts
        .iter()
        .filter(|a| {
            a.source_node_id == NodeId::new("a")
                && a.target_node_id.as_ref() == Some(&NodeId::new("b"))
        })
        .collect();
    assert_eq!(to_b.len(), 1);
    assert_eq!(to_b[0].content, "step finished");
}

/// A node finishing with no known dependents leaves one untargeted artifact,
/// adopted when a dependency edge is added later.
#[tokio::test]
async fn late_dependency_adopts_untargeted_handoff() {
    let w = world();
    w.seed_blueprint("bp", "Plan");
    w.seed_node("src", "bp", &[], 0);
    w.seed_node("late", "bp", &[], 1);

    w.fake.push_stdout(COMPLETE_STDOUT);
    w.driver.run_node(&NodeId::new("src")).unwrap().await.unwrap();

    let artifacts = w.store.artifacts_for_blueprint(&BlueprintId::new("bp")).unwrap();
    assert_eq!(artifacts.len(), 1);
    assert!(!artifacts[0].is_targeted());

    // the editor later wires late → src: the store backfills a targeted copy
    let mut counter = 0;
    w.store
        .set_node_dependencies(
            &NodeId::new("late"),
            &[NodeId::new("src")],
            w.clock.now(),
            || {
                counter += 1;
                format!("backfill-{counter}")
            },
        )
        .unwrap();

    let handoff = w
        .store
        .handoff_for(&NodeId::new("src"), &NodeId::new("late"))
        .unwrap()
        .unwrap();
    assert!(handoff.is_targeted());
    assert_eq!(handoff.content, "step finished");

    // and the next run of `late` sees it in the prompt
    w.fake.push_stdout(COMPLETE_STDOUT);
    w.driver.run_node(&NodeId::new("late")).unwrap().await.unwrap();
    let prompt = w
        .fake
        .calls()
        .into_iter()
        .filter_map(|c| match c {
            fm_adapters::AgentCall::Run { prompt, .. } => Some(prompt),
            _ => None,
        })
        .next_back()
        .unwrap();
    assert!(prompt.contains("step finished"));
    assert!(prompt.contains("step src"));
}
