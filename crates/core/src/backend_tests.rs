// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use bytes::Bytes;

use super::*;
use crate::session::PtySession;
use crate::test_support::EchoBackend;

fn fake_session(name: &str) -> Arc<PtySession> {
    Arc::new(PtySession::spawn(name, "/tmp", EchoBackend::new(), 4096))
}

#[tokio::test]
async fn register_then_lookup_round_trips() {
    let backend = SessionBackend::new();
    backend.register(fake_session("alpha")).await.unwrap();

    assert!(backend.session_exists("alpha").await);
    assert!(backend.get_session("alpha").await.is_some());
    assert!(backend.get_session("missing").await.is_none());
}

#[tokio::test]
async fn register_rejects_duplicate_name() {
    let backend = SessionBackend::new();
    backend.register(fake_session("dup")).await.unwrap();

    let err = backend.register(fake_session("dup")).await.unwrap_err();
    assert_eq!(err.kind(), "already_exists");
}

#[tokio::test]
async fn kill_session_is_tolerant_of_unknown_names() {
    let backend = SessionBackend::new();
    backend.kill_session("never-existed").await.unwrap();
}

#[tokio::test]
async fn kill_session_removes_it_from_the_registry() {
    let backend = SessionBackend::new();
    backend.register(fake_session("to-kill")).await.unwrap();

    backend.kill_session("to-kill").await.unwrap();

    assert!(!backend.session_exists("to-kill").await);
    assert!(backend.get_session("to-kill").await.is_none());
}

#[tokio::test]
async fn list_sessions_reflects_registered_entries() {
    let backend = SessionBackend::new();
    backend.register(fake_session("one")).await.unwrap();
    backend.register(fake_session("two")).await.unwrap();

    let mut names: Vec<_> = backend.list_sessions().await.into_iter().map(|s| s.name).collect();
    names.sort();
    assert_eq!(names, vec!["one".to_string(), "two".to_string()]);
}

#[tokio::test]
async fn capture_output_errors_on_unknown_session() {
    let backend = SessionBackend::new();
    let err = backend.capture_output("ghost", 10).await.unwrap_err();
    assert_eq!(err.kind(), "not_found");
}

#[tokio::test]
async fn capture_output_reflects_written_data() {
    let backend = SessionBackend::new();
    let session = fake_session("echo");
    backend.register(Arc::clone(&session)).await.unwrap();

    session.write(Bytes::from_static(b"hello world\n")).await.unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    let captured = backend.capture_output("echo", 10).await.unwrap();
    assert!(captured.contains("hello world"));
}

#[tokio::test]
async fn capture_output_defaults_lines_when_zero() {
    let backend = SessionBackend::new();
    backend.register(fake_session("zero-lines")).await.unwrap();
    // Should not panic or error when `lines` is 0; falls back to the default.
    backend.capture_output("zero-lines", 0).await.unwrap();
}
