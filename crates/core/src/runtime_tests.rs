// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;
use std::time::Duration;

use super::*;
use crate::backend::SessionBackend;
use crate::test_support::EchoBackend;

#[test]
fn runtime_type_round_trips_through_parse_and_as_str() {
    for rt in [RuntimeType::ClaudeCode, RuntimeType::GeminiCli, RuntimeType::CodexCli] {
        assert_eq!(RuntimeType::parse(rt.as_str()).unwrap(), rt);
    }
}

#[test]
fn runtime_type_parse_rejects_unknown_strings() {
    let err = RuntimeType::parse("unknown-thing").unwrap_err();
    assert_eq!(err.kind(), "failed_precondition");
}

#[tokio::test]
async fn wait_for_ready_succeeds_once_pattern_appears() {
    let backend = SessionBackend::new();
    let session = Arc::new(PtySession::spawn("claude-session", "/tmp", EchoBackend::new(), 4096));
    backend.register(Arc::clone(&session)).await.unwrap();

    // EchoBackend echoes writes back into the ring buffer; writing the
    // ready pattern simulates the runtime having reached its idle prompt.
    session.write(bytes::Bytes::from_static(b"? for shortcuts\n")).await.unwrap();

    let adapter = GenericRuntimeAdapter::new(RuntimeType::ClaudeCode);
    adapter.wait_for_ready(&backend, "claude-session", Duration::from_secs(2)).await.unwrap();
}

#[tokio::test]
async fn wait_for_ready_times_out_when_pattern_never_appears() {
    let backend = SessionBackend::new();
    let session = Arc::new(PtySession::spawn("quiet-session", "/tmp", EchoBackend::new(), 4096));
    backend.register(session).await.unwrap();

    let adapter = GenericRuntimeAdapter::new(RuntimeType::ClaudeCode);
    let err = adapter
        .wait_for_ready(&backend, "quiet-session", Duration::from_millis(50))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "timeout_exceeded");
}

#[tokio::test]
async fn is_running_reflects_kill_state() {
    let backend = SessionBackend::new();
    let session = Arc::new(PtySession::spawn("life-session", "/tmp", EchoBackend::new(), 4096));
    backend.register(Arc::clone(&session)).await.unwrap();

    let adapter = GenericRuntimeAdapter::new(RuntimeType::GeminiCli);
    assert!(adapter.is_running(&backend, "life-session").await);

    session.kill(nix::sys::signal::Signal::SIGTERM).unwrap();
    assert!(!adapter.is_running(&backend, "life-session").await);
}

#[tokio::test]
async fn detect_runtime_observes_a_screen_change_from_the_probe() {
    let backend = SessionBackend::new();
    let session = Arc::new(PtySession::spawn("probe-session", "/tmp", EchoBackend::new(), 4096));
    backend.register(session).await.unwrap();

    let adapter = GenericRuntimeAdapter::new(RuntimeType::CodexCli);
    let changed = adapter.detect_runtime(&backend, "probe-session").await.unwrap();
    assert!(changed, "echoing the probe key should change the captured tail");
}
