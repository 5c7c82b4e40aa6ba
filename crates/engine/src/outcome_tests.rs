// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use fm_core::test_support::{execution, t0};
use yare::parameterized;

fn output(stdout: &str) -> AgentRunOutput {
    AgentRunOutput {
        stdout: stdout.to_string(),
        stderr: String::new(),
        exit_code: Some(0),
        timed_out: false,
    }
}

fn exec() -> NodeExecution {
    execution("e1", "n1", "bp", t0())
}

#[test]
fn extracts_summary_from_last_marker_pair() {
    let stdout = "===TASK_COMPLETE===\nfirst\n===END_TASK===\nnoise\n===TASK_COMPLETE===\nsecond\n===END_TASK===\n";
    assert_eq!(extract_completion(stdout).as_deref(), Some("second"));
}

#[test]
fn unterminated_completion_block_is_ignored() {
    assert_eq!(extract_completion("===TASK_COMPLETE===\nno end"), None);
    assert_eq!(extract_completion("nothing here"), None);
}

#[test]
fn blocker_marker_must_start_a_line() {
    let inline = "see ===EXECUTION_BLOCKER=== mid-sentence";
    assert_eq!(extract_blocker(inline), None);

    let proper = "working...\n===EXECUTION_BLOCKER===\n{\"type\":\"creds\",\"description\":\"need AWS keys\"}";
    let info = extract_blocker(proper).unwrap();
    assert_eq!(info["description"], "need AWS keys");
}

#[test]
fn legacy_blocker_marker_is_equivalent() {
    let legacy = "---BLOCKER---\nwaiting on credentials";
    let info = extract_blocker(legacy).unwrap();
    assert_eq!(info["description"], "waiting on credentials");
}

#[parameterized(
    token_limit = { "request exceeded the output token maximum", false, FailureReason::OutputTokenLimit },
    context = { "the conversation is too long to continue", false, FailureReason::ContextExhausted },
    context_beats_timeout = { "context window exceeded", true, FailureReason::ContextExhausted },
    token_beats_context = { "output token maximum after context window", true, FailureReason::OutputTokenLimit },
    timeout_flag = { "", true, FailureReason::Timeout },
    sigterm_text = { "process received SIGTERM", false, FailureReason::Timeout },
    plain = { "segfault", false, FailureReason::Error },
)]
fn failure_classification_precedence(text: &str, timed_out: bool, expected: FailureReason) {
    assert_eq!(classify_failure(text, timed_out), expected);
}

#[test]
fn reported_done_beats_everything() {
    let mut e = exec();
    e.reported_status = Some(ReportedStatus::Done);
    e.task_summary = Some("callback summary".to_string());

    // stdout says blocker, callback says done: callback wins
    let out = output("===EXECUTION_BLOCKER===\n{\"description\":\"x\"}");
    let verdict = classify(&e, &out, true, false);
    assert_eq!(
        verdict,
        RunVerdict::Done {
            summary: "callback summary".to_string()
        }
    );
}

#[test]
fn reported_blocked_uses_reason_text() {
    let mut e = exec();
    e.reported_status = Some(ReportedStatus::Blocked);
    e.reported_reason = Some("waiting on credentials".to_string());

    let verdict = classify(&e, &output("irrelevant"), true, false);
    match verdict {
        RunVerdict::Blocked { text, .. } => assert_eq!(text, "waiting on credentials"),
        other => panic!("expected blocked, got {other:?}"),
    }
}

#[test]
fn blocker_info_without_status_report_blocks() {
    let mut e = exec();
    e.blocker_info = Some(serde_json::json!({
        "description": "blocked on approvals",
        "suggestion": "ping the admin"
    }));

    let verdict = classify(&e, &output("some text"), true, false);
    match verdict {
        RunVerdict::Blocked { text, .. } => {
            assert_eq!(text, "blocked on approvals (suggestion: ping the admin)")
        }
        other => panic!("expected blocked, got {other:?}"),
    }
}

#[test]
fn completion_block_yields_done() {
    let out = output("preamble\n===TASK_COMPLETE===\nImplemented the parser\n===END_TASK===\n");
    let verdict = classify(&exec(), &out, true, false);
    assert_eq!(
        verdict,
        RunVerdict::Done {
            summary: "Implemented the parser".to_string()
        }
    );
}

#[test]
fn timeout_classifies_before_hung() {
    let out = AgentRunOutput {
        stdout: String::new(),
        stderr: String::new(),
        exit_code: None,
        timed_out: true,
    };
    let verdict = classify(&exec(), &out, false, false);
    assert!(matches!(
        verdict,
        RunVerdict::Failed {
            reason: FailureReason::Timeout,
            ..
        }
    ));
}

#[test]
fn short_output_without_session_is_hung() {
    let verdict = classify(&exec(), &output("hm"), false, false);
    assert!(matches!(
        verdict,
        RunVerdict::Failed {
            reason: FailureReason::Hung,
            ..
        }
    ));
}

#[test]
fn short_output_with_session_is_generic_error() {
    let verdict = classify(&exec(), &output("hm"), true, false);
    assert!(matches!(
        verdict,
        RunVerdict::Failed {
            reason: FailureReason::Error,
            ..
        }
    ));
}

#[test]
fn long_markerless_output_counts_as_done() {
    let text = "I refactored the module, moved the validation logic, and updated the tests to cover the new cases.";
    let verdict = classify(&exec(), &output(text), true, false);
    assert_eq!(
        verdict,
        RunVerdict::Done {
            summary: text.to_string()
        }
    );
}

#[test]
fn nonzero_exit_uses_stderr_detail() {
    let out = AgentRunOutput {
        stdout: "partial work".repeat(10),
        stderr: "fatal: repository locked".to_string(),
        exit_code: Some(1),
        timed_out: false,
    };
    let verdict = classify(&exec(), &out, false, false);
    match verdict {
        RunVerdict::Failed { reason, detail } => {
            assert_eq!(reason, FailureReason::Error);
            assert_eq!(detail, "fatal: repository locked");
        }
        other => panic!("expected failed, got {other:?}"),
    }
}

#[test]
fn echo_strip_cuts_after_last_marker() {
    let stdout = "prompt text...\nBegin working now.\nactual agent answer that is plenty long enough to not be hung";
    let verdict = classify(&exec(), &output(stdout), true, true);
    match verdict {
        RunVerdict::Done { summary } => {
            assert_eq!(
                summary,
                "actual agent answer that is plenty long enough to not be hung"
            );
        }
        other => panic!("expected done, got {other:?}"),
    }
}

#[test]
fn echo_strip_keeps_trailing_portion_without_markers() {
    let stdout = "a".repeat(100);
    let verdict = classify(&exec(), &output(&stdout), true, true);
    match verdict {
        RunVerdict::Done { summary } => assert_eq!(summary.len(), 60),
        other => panic!("expected done, got {other:?}"),
    }
}
