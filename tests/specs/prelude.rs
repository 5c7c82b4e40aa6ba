//! Shared fixture for the executor specs.

use fm_adapters::{AgentRegistry, FakeAgentAdapter};
use fm_core::test_support::{blueprint, node};
use fm_core::{FakeClock, MacroNode, SequentialIdGen};
use fm_engine::{EngineConfig, ExecutionDriver, RecoverySubsystem};
use fm_storage::Store;
use std::sync::Arc;

pub use fm_core::Clock;

pub const COMPLETE_STDOUT: &str = "===TASK_COMPLETE===\nstep finished\n===END_TASK===\n";

pub type TestDriver = ExecutionDriver<FakeClock, SequentialIdGen>;

pub struct World {
    pub driver: TestDriver,
    pub recovery: RecoverySubsystem<FakeClock, SequentialIdGen>,
    pub store: Store,
    pub fake: FakeAgentAdapter,
    pub clock: FakeClock,
}

pub fn world() -> World {
    let store = Store::open_in_memory().expect("in-memory store");
    let fake = FakeAgentAdapter::new();
    let mut agents = AgentRegistry::new();
    agents.register(Arc::new(fake.clone()));
    let clock = FakeClock::new();
    let driver = ExecutionDriver::new(
        store.clone(),
        agents,
        clock.clone(),
        SequentialIdGen::new("spec"),
        EngineConfig::for_tests("http://127.0.0.1:7410"),
    );
    World {
        recovery: RecoverySubsystem::new(driver.clone()),
        driver,
        store,
        fake,
        clock,
    }
}

impl World {
    /// Create a blueprint wired to the fake agent.
    pub fn seed_blueprint(&self, id: &str, title: &str) {
        let mut bp = blueprint(id, title);
        bp.agent_type = Some("fake".to_string());
        self.store.create_blueprint(&bp).expect("create blueprint");
    }

    pub fn seed_node(&self, id: &str, blueprint_id: &str, deps: &[&str], order: i64) -> MacroNode {
        let mut n = node(id, blueprint_id, deps);
        n.node_order = order;
        n.title = format!("step {id}");
        self.store.create_node(&n).expect("create node");
        n
    }
}
