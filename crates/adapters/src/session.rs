// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session-file discovery: encoded project directories, new-session
//! detection and the mtime liveness heuristic

use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Map an absolute path to a single directory-name segment.
///
/// `/`, `\` and `:` each become `-`, so `/home/u/p` → `-home-u-p` and
/// `C:\Users\x\p` → `C--Users-x-p`. Deterministic and collision-tolerant
/// enough for per-project session directories.
pub fn encode_cwd(cwd: &Path) -> String {
    cwd.display()
        .to_string()
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' => '-',
            other => other,
        })
        .collect()
}

/// Directory the agent writes session files for `cwd` into.
pub fn sessions_dir(agent_home: &Path, cwd: &Path) -> PathBuf {
    agent_home.join("projects").join(encode_cwd(cwd))
}

/// Newest session file modified strictly after `since`, if any.
///
/// Returns the file stem (the agent's session id). Ties resolve to the most
/// recently modified file.
pub async fn detect_new_session(
    dir: &Path,
    since: DateTime<Utc>,
) -> std::io::Result<Option<String>> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(err),
    };

    let mut newest: Option<(DateTime<Utc>, String)> = None;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("jsonl") {
            continue;
        }
        let Ok(meta) = entry.metadata().await else {
            continue;
        };
        let Ok(modified) = meta.modified() else {
            continue;
        };
        let modified: DateTime<Utc> = modified.into();
        if modified <= since {
            continue;
        }
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        if newest.as_ref().is_none_or(|(best, _)| modified > *best) {
            newest = Some((modified, stem.to_string()));
        }
    }

    Ok(newest.map(|(_, stem)| stem))
}

/// Liveness heuristic: the session file was modified within `window` of `now`.
///
/// The window is 2× the node subprocess timeout by default; an agent that has
/// written nothing for that long is treated as gone.
pub async fn is_session_alive(
    dir: &Path,
    session_id: &str,
    now: DateTime<Utc>,
    window: Duration,
) -> bool {
    let path = dir.join(format!("{session_id}.jsonl"));
    let Ok(meta) = tokio::fs::metadata(&path).await else {
        return false;
    };
    let Ok(modified) = meta.modified() else {
        return false;
    };
    let modified: DateTime<Utc> = modified.into();
    let age = now.signed_duration_since(modified);
    age <= chrono::TimeDelta::from_std(window).unwrap_or_else(|_| chrono::TimeDelta::zero())
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
