// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! fm-adapters: the boundary to external AI coding agents
//!
//! One [`AgentAdapter`] per agent CLI. The executor never shells out or
//! inspects session files outside this crate.

pub mod agent;
pub mod session;
pub mod subprocess;

pub use agent::{
    AgentAdapter, AgentAdapterError, AgentRegistry, AgentRunOutput, AgentRunRequest,
    ClaudeAgentAdapter, DEFAULT_AGENT_TYPE,
};
#[cfg(any(test, feature = "test-support"))]
pub use agent::{AgentCall, FakeAgentAdapter};
pub use session::encode_cwd;
