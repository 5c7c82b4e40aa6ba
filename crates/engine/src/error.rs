// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error types for the executor engine

use fm_adapters::AgentAdapterError;
use fm_storage::StoreError;
use thiserror::Error;

/// Errors surfaced to callers of the execution driver.
///
/// Failures inside a queued task never escape the drain loop; they are
/// persisted to the execution row instead (see the driver).
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("storage error: {0}")]
    Store(#[from] StoreError),
    #[error("agent error: {0}")]
    Agent(#[from] AgentAdapterError),
    #[error("dependencies not satisfied: {0}")]
    DependencyUnmet(String),
    #[error("invalid state: {0}")]
    InvalidState(String),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}
