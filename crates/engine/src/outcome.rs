// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Run outcome classification
//!
//! Combines the agent's HTTP-reported status, stdout markers, and the
//! subprocess result into a single verdict. Callback data always wins over
//! text scraping.

use fm_adapters::AgentRunOutput;
use fm_core::{FailureReason, NodeExecution, ReportedStatus};

/// Marks the start of a success summary in stdout.
pub const TASK_COMPLETE_MARKER: &str = "===TASK_COMPLETE===";
/// Marks the end of a success summary.
pub const END_TASK_MARKER: &str = "===END_TASK===";
/// Start-of-line blocker marker; the remainder of the output is the payload.
pub const BLOCKER_MARKER: &str = "===EXECUTION_BLOCKER===";
/// Legacy alias of [`BLOCKER_MARKER`]; treated identically.
pub const LEGACY_BLOCKER_MARKER: &str = "---BLOCKER---";

/// Minimum stdout length for a markerless exit to count as meaningful output.
const HUNG_OUTPUT_THRESHOLD: usize = 50;

/// Markers the deprecated echo-strip fallback cuts after.
const ECHO_STRIP_MARKERS: &[&str] = &[END_TASK_MARKER, "Begin working now.", "---"];

/// Final verdict for one execution.
#[derive(Debug, Clone, PartialEq)]
pub enum RunVerdict {
    Done { summary: String },
    Blocked { info: serde_json::Value, text: String },
    Failed { reason: FailureReason, detail: String },
}

/// Extract the summary between the last-occurring completion marker pair.
pub fn extract_completion(stdout: &str) -> Option<String> {
    let start = stdout.rfind(TASK_COMPLETE_MARKER)?;
    let after_start = &stdout[start + TASK_COMPLETE_MARKER.len()..];
    let end = after_start.find(END_TASK_MARKER)?;
    Some(after_start[..end].trim().to_string())
}

/// Extract a blocker payload from stdout, honoring both marker spellings.
///
/// The marker must start a line; everything after it (to end of output) is
/// the payload, parsed as JSON when possible and wrapped as text otherwise.
pub fn extract_blocker(stdout: &str) -> Option<serde_json::Value> {
    for marker in [BLOCKER_MARKER, LEGACY_BLOCKER_MARKER] {
        for (idx, _) in stdout.match_indices(marker) {
            let at_line_start = idx == 0 || stdout.as_bytes()[idx - 1] == b'\n';
            if !at_line_start {
                continue;
            }
            let payload = stdout[idx + marker.len()..].trim();
            if payload.is_empty() {
                return Some(serde_json::json!({ "description": "blocker reported" }));
            }
            return Some(
                serde_json::from_str(payload)
                    .unwrap_or_else(|_| serde_json::json!({ "description": payload })),
            );
        }
    }
    None
}

/// Classify failure text into the §7 taxonomy.
///
/// Precedence: output_token_limit > context_exhausted > timeout > error.
pub fn classify_failure(error_text: &str, timed_out: bool) -> FailureReason {
    let lower = error_text.to_lowercase();
    if lower.contains("output token maximum") {
        return FailureReason::OutputTokenLimit;
    }
    if lower.contains("context window")
        || lower.contains("conversation is too long")
        || lower.contains("context_exhausted")
        || lower.contains("max_tokens_exceeded")
    {
        return FailureReason::ContextExhausted;
    }
    if timed_out || lower.contains("sigterm") || lower.contains("etimedout") {
        return FailureReason::Timeout;
    }
    FailureReason::Error
}

/// Human-readable blocker text for the node's error column.
pub fn blocker_text(info: &serde_json::Value) -> String {
    let description = info
        .get("description")
        .and_then(|v| v.as_str())
        .unwrap_or("execution blocked");
    match info.get("suggestion").and_then(|v| v.as_str()) {
        Some(suggestion) if !suggestion.is_empty() => {
            format!("{description} (suggestion: {suggestion})")
        }
        _ => description.to_string(),
    }
}

/// Decide the verdict for a finished run.
///
/// `execution` is the row re-read after process exit, so callback-written
/// fields are current. `session_detected` reflects the post-exit session
/// scan.
pub fn classify(
    execution: &NodeExecution,
    output: &AgentRunOutput,
    session_detected: bool,
    strip_echoed_prompt: bool,
) -> RunVerdict {
    // 1. Explicit report through the status callback wins outright.
    if let Some(reported) = execution.reported_status {
        return match reported {
            ReportedStatus::Done => RunVerdict::Done {
                summary: reported_summary(execution, output, strip_echoed_prompt),
            },
            ReportedStatus::Blocked => {
                let info = execution.blocker_info.clone().unwrap_or_else(|| {
                    serde_json::json!({
                        "description": execution
                            .reported_reason
                            .clone()
                            .unwrap_or_else(|| "execution blocked".to_string())
                    })
                });
                let text = blocker_text(&info);
                RunVerdict::Blocked { info, text }
            }
            ReportedStatus::Failed => {
                let detail = execution
                    .reported_reason
                    .clone()
                    .unwrap_or_else(|| "agent reported failure".to_string());
                RunVerdict::Failed {
                    reason: classify_failure(&detail, output.timed_out),
                    detail,
                }
            }
        };
    }

    // 2. Blocker callback without a status report.
    if let Some(info) = &execution.blocker_info {
        let text = blocker_text(info);
        return RunVerdict::Blocked {
            info: info.clone(),
            text,
        };
    }

    // 3. Stdout markers.
    if let Some(info) = extract_blocker(&output.stdout) {
        let text = blocker_text(&info);
        return RunVerdict::Blocked { info, text };
    }
    if let Some(summary) = extract_completion(&output.stdout) {
        return RunVerdict::Done { summary };
    }

    // 4. Subprocess-level failures.
    if output.timed_out {
        return RunVerdict::Failed {
            reason: classify_failure(&output.stderr, true),
            detail: "agent run exceeded its wall-clock budget".to_string(),
        };
    }
    if output.exit_code != Some(0) {
        let detail = if output.stderr.trim().is_empty() {
            format!("agent exited with code {:?}", output.exit_code)
        } else {
            output.stderr.trim().to_string()
        };
        return RunVerdict::Failed {
            reason: classify_failure(&detail, false),
            detail,
        };
    }

    // 5. Markerless exit: tiny output with no session file means the agent
    //    never actually did anything.
    if output.stdout.trim().len() < HUNG_OUTPUT_THRESHOLD {
        if session_detected {
            return RunVerdict::Failed {
                reason: FailureReason::Error,
                detail: "agent exited with no usable output".to_string(),
            };
        }
        return RunVerdict::Failed {
            reason: FailureReason::Hung,
            detail: "agent produced no session and no output".to_string(),
        };
    }

    RunVerdict::Done {
        summary: fallback_summary(&output.stdout, strip_echoed_prompt),
    }
}

fn reported_summary(
    execution: &NodeExecution,
    output: &AgentRunOutput,
    strip_echoed_prompt: bool,
) -> String {
    if let Some(summary) = &execution.task_summary {
        return summary.clone();
    }
    if let Some(summary) = extract_completion(&output.stdout) {
        return summary;
    }
    fallback_summary(&output.stdout, strip_echoed_prompt)
}

fn fallback_summary(stdout: &str, strip_echoed_prompt: bool) -> String {
    let text = if strip_echoed_prompt {
        strip_echo(stdout)
    } else {
        stdout
    };
    text.trim().to_string()
}

/// Deprecated echo-strip heuristic, kept for parity behind a config flag:
/// take the substring after the last known marker, else the trailing 60%.
fn strip_echo(stdout: &str) -> &str {
    let mut best: Option<usize> = None;
    for marker in ECHO_STRIP_MARKERS {
        if let Some(idx) = stdout.rfind(marker) {
            let after = idx + marker.len();
            if best.is_none_or(|b| after > b) {
                best = Some(after);
            }
        }
    }
    if let Some(idx) = best {
        return &stdout[idx..];
    }
    // No marker: keep the trailing 60%
    let cut = stdout.len() * 2 / 5;
    let mut boundary = cut;
    while boundary < stdout.len() && !stdout.is_char_boundary(boundary) {
        boundary += 1;
    }
    &stdout[boundary..]
}

#[cfg(test)]
#[path = "outcome_tests.rs"]
mod tests;
