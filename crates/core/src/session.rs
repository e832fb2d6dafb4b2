// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! One managed PTY session (C2): owns a [`Backend`], fans its output out
//! to a bounded set of listeners, and exposes write/resize/kill.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use nix::sys::signal::Signal;
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot, Notify};

use crate::error::{CoreError, CoreResult};
use crate::pty::{Boxed, ExitStatus, SignalHandle};
use crate::ring::RingBuffer;

/// Maximum number of registered data listeners per session.
pub const MAX_DATA_LISTENERS: usize = 100;
/// Maximum number of registered exit listeners per session.
pub const MAX_EXIT_LISTENERS: usize = 50;

/// Default ring buffer capacity per session: 10 MiB, per the output
/// stream contract.
pub const DEFAULT_RING_CAPACITY: usize = 10 * 1024 * 1024;

/// Opaque handle returned from listener registration, used to unregister.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenerId(usize);

struct Shared {
    ring: Mutex<RingBuffer>,
    data_listeners: Mutex<Vec<Option<mpsc::Sender<Bytes>>>>,
    exit_listeners: Mutex<Vec<Option<oneshot::Sender<ExitStatus>>>>,
    killed: AtomicBool,
    child_pid: std::sync::atomic::AtomicU32,
    /// Set once by the reaper task when the backend's `run` future
    /// resolves, to the process's actual exit status.
    exit_status: Mutex<Option<ExitStatus>>,
    /// Fired once after `exit_status` is set, so `force_kill` can wait on
    /// the real exit without racing the reaper.
    exited: Notify,
}

/// A single managed PTY session.
pub struct PtySession {
    name: String,
    shared: Arc<Shared>,
    input_tx: mpsc::Sender<Bytes>,
    resize_tx: mpsc::Sender<(u16, u16)>,
    signal_fn: SignalHandle,
    created_at: std::time::Instant,
    cwd: String,
}

impl PtySession {
    /// Spawn `backend` and start driving it; returns a session handle that
    /// outlives the spawned backend task.
    pub fn spawn(name: impl Into<String>, cwd: impl Into<String>, backend: impl Boxed, ring_capacity: usize) -> Self {
        let mut backend = backend.boxed();
        let name = name.into();

        let child_pid = backend.child_pid().unwrap_or(0);
        // Extract the signal handle before `backend` moves into its driver
        // task below; this is what lets `kill`/`force_kill` still reach it.
        let signal_fn = backend.signal_handle();

        let shared = Arc::new(Shared {
            ring: Mutex::new(RingBuffer::new(ring_capacity)),
            data_listeners: Mutex::new(Vec::new()),
            exit_listeners: Mutex::new(Vec::new()),
            killed: AtomicBool::new(false),
            child_pid: std::sync::atomic::AtomicU32::new(child_pid),
            exit_status: Mutex::new(None),
            exited: Notify::new(),
        });

        let (output_tx, mut output_rx) = mpsc::channel::<Bytes>(256);
        let (input_tx, input_rx) = mpsc::channel::<Bytes>(256);
        let (resize_tx, resize_rx) = mpsc::channel::<(u16, u16)>(4);

        let backend_handle = tokio::spawn(async move { backend.run(output_tx, input_rx, resize_rx).await });

        let reaper_shared = Arc::clone(&shared);
        tokio::spawn(async move {
            let status = match backend_handle.await {
                Ok(Ok(status)) => status,
                Ok(Err(_)) | Err(_) => ExitStatus { code: None, signal: None },
            };
            reaper_shared.record_exit(status);
        });

        let dispatch_shared = Arc::clone(&shared);
        tokio::spawn(async move {
            while let Some(chunk) = output_rx.recv().await {
                dispatch_shared.ring.lock().write(&chunk);
                let mut listeners = dispatch_shared.data_listeners.lock();
                for slot in listeners.iter_mut() {
                    if let Some(tx) = slot {
                        if tx.try_send(chunk.clone()).is_err() {
                            // Slow or gone listener: drop it so the slot is reusable.
                            *slot = None;
                        }
                    }
                }
            }
        });

        Self {
            name,
            shared,
            input_tx,
            resize_tx,
            signal_fn,
            created_at: std::time::Instant::now(),
            cwd: cwd.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn cwd(&self) -> &str {
        &self.cwd
    }

    pub fn created_at(&self) -> std::time::Instant {
        self.created_at
    }

    pub fn child_pid(&self) -> u32 {
        self.shared.child_pid.load(Ordering::Acquire)
    }

    pub fn is_killed(&self) -> bool {
        self.shared.killed.load(Ordering::Acquire)
    }

    /// Write raw bytes to the PTY. Fails if the session has been killed.
    pub async fn write(&self, data: Bytes) -> CoreResult<()> {
        if self.is_killed() {
            return Err(CoreError::failed_precondition(format!("session {} is killed", self.name)));
        }
        self.input_tx
            .send(data)
            .await
            .map_err(|_| CoreError::failed_precondition(format!("session {} backend is gone", self.name)))
    }

    pub async fn resize(&self, cols: u16, rows: u16) -> CoreResult<()> {
        if self.is_killed() {
            return Err(CoreError::failed_precondition(format!("session {} is killed", self.name)));
        }
        self.resize_tx
            .send((cols, rows))
            .await
            .map_err(|_| CoreError::failed_precondition(format!("session {} backend is gone", self.name)))
    }

    /// Capture the last `lines` lines from the ring buffer, capped to
    /// `max_bytes` (per-request payload cap).
    pub fn capture_output(&self, lines: usize, max_bytes: usize) -> String {
        self.shared.ring.lock().last_lines(lines, max_bytes)
    }

    /// Register a listener for raw output chunks. Fails fast once
    /// [`MAX_DATA_LISTENERS`] slots are occupied.
    pub fn on_data(&self, tx: mpsc::Sender<Bytes>) -> CoreResult<ListenerId> {
        let mut listeners = self.shared.data_listeners.lock();
        if let Some(idx) = listeners.iter().position(|s| s.is_none()) {
            listeners[idx] = Some(tx);
            return Ok(ListenerId(idx));
        }
        if listeners.len() < MAX_DATA_LISTENERS {
            listeners.push(Some(tx));
            return Ok(ListenerId(listeners.len() - 1));
        }
        Err(CoreError::resource_exhausted(format!(
            "data listener cap of {MAX_DATA_LISTENERS} reached for session {}",
            self.name
        )))
    }

    pub fn off_data(&self, id: ListenerId) {
        let mut listeners = self.shared.data_listeners.lock();
        if let Some(slot) = listeners.get_mut(id.0) {
            *slot = None;
        }
    }

    /// Register a one-shot listener fired exactly once when the process exits.
    pub fn on_exit(&self, tx: oneshot::Sender<ExitStatus>) -> CoreResult<ListenerId> {
        let mut listeners = self.shared.exit_listeners.lock();
        if let Some(idx) = listeners.iter().position(|s| s.is_none()) {
            listeners[idx] = Some(tx);
            return Ok(ListenerId(idx));
        }
        if listeners.len() < MAX_EXIT_LISTENERS {
            listeners.push(Some(tx));
            return Ok(ListenerId(listeners.len() - 1));
        }
        Err(CoreError::resource_exhausted(format!(
            "exit listener cap of {MAX_EXIT_LISTENERS} reached for session {}",
            self.name
        )))
    }

    pub fn off_exit(&self, id: ListenerId) {
        let mut listeners = self.shared.exit_listeners.lock();
        if let Some(slot) = listeners.get_mut(id.0) {
            *slot = None;
        }
    }

    /// Send `signal` to the child process. Idempotent: killing an already
    /// killed session is a no-op success. Exit listeners are notified by
    /// the reaper task once the process has actually exited, not here.
    pub fn kill(&self, signal: Signal) -> CoreResult<()> {
        if self.shared.killed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        (self.signal_fn)(signal).map_err(|e| CoreError::Internal(e.to_string()))
    }

    /// Escalate: send SIGTERM, wait a bounded grace period, then SIGKILL
    /// if the process hasn't exited yet by then.
    pub async fn force_kill(&self) -> CoreResult<()> {
        let already_killed = self.shared.killed.swap(true, Ordering::AcqRel);
        if !already_killed {
            let _ = (self.signal_fn)(Signal::SIGTERM);
        }

        let notified = self.shared.exited.notified();
        let exited = self.shared.exit_status.lock().is_some();
        if !exited {
            let _ = tokio::time::timeout(Duration::from_millis(500), notified).await;
        }

        if self.shared.exit_status.lock().is_none() {
            let _ = (self.signal_fn)(Signal::SIGKILL);
        }
        Ok(())
    }
}

impl Shared {
    /// Called exactly once by the reaper task with the process's actual
    /// exit status; fans it out to every registered exit listener.
    fn record_exit(&self, status: ExitStatus) {
        *self.exit_status.lock() = Some(status);
        self.exited.notify_waiters();

        let mut listeners = self.exit_listeners.lock();
        for slot in listeners.iter_mut() {
            if let Some(tx) = slot.take() {
                let _ = tx.send(status);
            }
        }
    }
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
