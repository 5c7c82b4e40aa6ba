// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon startup phases
//!
//! Order matters: lock → store → recovery → monitor loop → (caller binds the
//! listener). Recovery completes before any HTTP handler can accept a new
//! run request.

use crate::env::Config;
use fm_adapters::{AgentRegistry, ClaudeAgentAdapter};
use fm_core::{SystemClock, UuidIdGen};
use fm_engine::{EngineConfig, ExecutionDriver, RecoveryReport, RecoverySubsystem};
use fm_storage::{Store, StoreError};
use fs2::FileExt;
use std::fs::File;
use std::sync::Arc;
use thiserror::Error;

/// The concrete driver type the daemon runs.
pub type Driver = ExecutionDriver<SystemClock, UuidIdGen>;
pub type Recovery = RecoverySubsystem<SystemClock, UuidIdGen>;

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("failed to acquire daemon lock: {0}")]
    LockFailed(String),
    #[error("storage error: {0}")]
    Store(#[from] StoreError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// A started daemon, ready to serve.
pub struct Daemon {
    pub driver: Driver,
    pub recovery: Recovery,
    pub recovery_report: RecoveryReport,
    /// Held for the process lifetime; dropping releases the lock.
    _lock: File,
}

/// Run the startup phases through recovery.
pub async fn startup(config: &Config) -> Result<Daemon, LifecycleError> {
    std::fs::create_dir_all(&config.state_dir)?;

    let lock = File::create(&config.lock_path)?;
    lock.try_lock_exclusive()
        .map_err(|e| LifecycleError::LockFailed(e.to_string()))?;
    std::fs::write(&config.lock_path, format!("{}\n", std::process::id()))?;

    let store = Store::open(&config.db_path)?;

    let mut agents = AgentRegistry::new();
    agents.register(Arc::new(ClaudeAgentAdapter::new()));

    let mut engine_config = EngineConfig::new(config.callback_base());
    if let Some(timeout) = config.node_timeout {
        engine_config.node_timeout = timeout;
        engine_config.session_alive_window = timeout * 2;
    }
    engine_config.strip_echoed_prompt = config.strip_echoed_prompt;

    let driver = ExecutionDriver::new(store, agents, SystemClock, UuidIdGen, engine_config);

    // Phase gate: recovery completes before the caller binds the listener
    let recovery = RecoverySubsystem::new(driver.clone());
    let recovery_report = recovery.run_startup().await;
    recovery.spawn_monitor_loop();

    Ok(Daemon {
        driver,
        recovery,
        recovery_report,
        _lock: lock,
    })
}
