// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Environment-driven daemon configuration

use std::path::PathBuf;
use std::time::Duration;

/// Default HTTP port for the callback/control surface.
pub const DEFAULT_HTTP_PORT: u16 = 7410;

/// Daemon configuration, resolved once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub state_dir: PathBuf,
    pub db_path: PathBuf,
    pub log_path: PathBuf,
    pub lock_path: PathBuf,
    pub http_port: u16,
    pub node_timeout: Option<Duration>,
    pub log_filter: String,
    pub strip_echoed_prompt: bool,
}

impl Config {
    /// Resolve configuration from the environment.
    ///
    /// `FM_STATE_DIR` overrides the state directory; `FM_HTTP_PORT`,
    /// `FM_NODE_TIMEOUT_SECS`, `FM_LOG_FILTER` and `FM_STRIP_ECHOED_PROMPT`
    /// tune the rest.
    pub fn load() -> Self {
        let state_dir = std::env::var("FM_STATE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| default_state_dir());

        let http_port = std::env::var("FM_HTTP_PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_HTTP_PORT);

        let node_timeout = std::env::var("FM_NODE_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .map(Duration::from_secs);

        let log_filter =
            std::env::var("FM_LOG_FILTER").unwrap_or_else(|_| "info".to_string());

        let strip_echoed_prompt = std::env::var("FM_STRIP_ECHOED_PROMPT")
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        Self {
            db_path: state_dir.join("foreman.db"),
            log_path: state_dir.join("fmd.log"),
            lock_path: state_dir.join("fmd.lock"),
            state_dir,
            http_port,
            node_timeout,
            log_filter,
            strip_echoed_prompt,
        }
    }

    /// Base URL agents POST callbacks to.
    pub fn callback_base(&self) -> String {
        format!("http://127.0.0.1:{}", self.http_port)
    }
}

fn default_state_dir() -> PathBuf {
    dirs::state_dir()
        .or_else(dirs::data_local_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join("foreman")
}

#[cfg(test)]
#[path = "env_tests.rs"]
mod tests;
