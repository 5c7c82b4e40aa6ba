// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn paths_derive_from_state_dir() {
    let config = Config {
        state_dir: PathBuf::from("/tmp/fm-test"),
        db_path: PathBuf::from("/tmp/fm-test/foreman.db"),
        log_path: PathBuf::from("/tmp/fm-test/fmd.log"),
        lock_path: PathBuf::from("/tmp/fm-test/fmd.lock"),
        http_port: 7410,
        node_timeout: None,
        log_filter: "info".to_string(),
        strip_echoed_prompt: false,
    };
    assert_eq!(config.callback_base(), "http://127.0.0.1:7410");
}

#[test]
fn default_state_dir_is_not_empty() {
    let dir = default_state_dir();
    assert!(dir.ends_with("foreman"));
}
