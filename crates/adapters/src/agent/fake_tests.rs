// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn req(prompt: &str) -> AgentRunRequest {
    AgentRunRequest::new(prompt, "/test/project", Duration::from_secs(5))
}

#[tokio::test]
async fn scripted_outputs_are_consumed_in_order() {
    let fake = FakeAgentAdapter::new();
    fake.push_stdout("first");
    fake.push_stdout("second");

    let a = fake.run(req("one")).await.unwrap();
    let b = fake.run(req("two")).await.unwrap();
    assert_eq!(a.stdout, "first");
    assert_eq!(b.stdout, "second");
}

#[tokio::test]
async fn unscripted_run_returns_default_success() {
    let fake = FakeAgentAdapter::new();
    let out = fake.run(req("anything")).await.unwrap();
    assert!(out.exited_normally());
}

#[tokio::test]
async fn errors_propagate() {
    let fake = FakeAgentAdapter::new();
    fake.push_run_error(AgentAdapterError::SpawnFailed("no binary".to_string()));
    let err = fake.run(req("x")).await.unwrap_err();
    assert!(matches!(err, AgentAdapterError::SpawnFailed(_)));
}

#[tokio::test]
async fn calls_are_recorded() {
    let fake = FakeAgentAdapter::new();
    fake.run(req("r")).await.unwrap();
    fake.resume("sess-1", req("continue")).await.unwrap();
    fake.detect_new_session(Path::new("/p"), Utc::now())
        .await
        .unwrap();

    let calls = fake.calls();
    assert_eq!(calls.len(), 3);
    assert!(matches!(calls[0], AgentCall::Run { .. }));
    assert!(matches!(calls[1], AgentCall::Resume { ref session_id, .. } if session_id == "sess-1"));
    assert!(matches!(calls[2], AgentCall::DetectSession { .. }));
    assert_eq!(fake.run_count(), 2);
}

#[tokio::test]
async fn pid_is_reported_unless_suppressed() {
    let fake = FakeAgentAdapter::new();
    let (tx, rx) = tokio::sync::oneshot::channel();
    fake.run(req("p").with_pid_tx(tx)).await.unwrap();
    assert_eq!(rx.await.unwrap(), 4242);

    fake.suppress_pid();
    let (tx, rx) = tokio::sync::oneshot::channel();
    fake.run(req("p").with_pid_tx(tx)).await.unwrap();
    assert!(rx.await.is_err());
}

#[tokio::test]
async fn run_hook_fires_during_run() {
    let fake = FakeAgentAdapter::new();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let seen_clone = seen.clone();
    fake.set_run_hook(move |req| {
        seen_clone.lock().push(req.prompt.clone());
    });

    fake.run(req("hooked")).await.unwrap();
    assert_eq!(seen.lock().clone(), vec!["hooked".to_string()]);
}

#[tokio::test]
async fn liveness_defaults_to_dead() {
    let fake = FakeAgentAdapter::new();
    assert!(!fake
        .is_session_alive(Path::new("/p"), "s", Duration::from_secs(60))
        .await
        .unwrap());

    fake.set_alive("s", true);
    assert!(fake
        .is_session_alive(Path::new("/p"), "s", Duration::from_secs(60))
        .await
        .unwrap());
}
