// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Terminal backend abstraction: the process actually wired to a PTY.
//!
//! [`Backend`] is object-safe so a [`crate::session::PtySession`] can hold
//! `Box<dyn Backend>` without knowing which concrete child-process
//! mechanism spawned it (native `forkpty`, or a fake backend in tests).

pub mod nbio;
pub mod spawn;

use std::future::Future;
use std::pin::Pin;

use bytes::Bytes;
use nix::sys::signal::Signal;
use tokio::sync::mpsc;

/// How a child process terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitStatus {
    pub code: Option<i32>,
    pub signal: Option<i32>,
}

/// A detached signal-delivery function, extracted from a [`Backend`]
/// before it is moved into its driver task so the owning
/// [`crate::session::PtySession`] can still kill it afterward.
pub type SignalHandle = std::sync::Arc<dyn Fn(Signal) -> anyhow::Result<()> + Send + Sync>;

/// Terminal backend abstraction over a PTY-attached child process.
pub trait Backend: Send + 'static {
    /// Drive the backend's I/O loop until the child exits or `input_rx`
    /// closes. Reads flow to `output_tx`; writes come from `input_rx`;
    /// resize requests come from `resize_rx`.
    fn run(
        &mut self,
        output_tx: mpsc::Sender<Bytes>,
        input_rx: mpsc::Receiver<Bytes>,
        resize_rx: mpsc::Receiver<(u16, u16)>,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<ExitStatus>> + Send + '_>>;

    /// PID of the child process, once spawned.
    fn child_pid(&self) -> Option<u32>;

    /// Extract a standalone signal-delivery closure. Called before `run`
    /// moves `self` into its driver task.
    fn signal_handle(&self) -> SignalHandle;
}

/// Conversion trait so both concrete backends and `Box<dyn Backend>` can be
/// passed to [`crate::session::PtySession::spawn`] without explicit boxing.
pub trait Boxed {
    fn boxed(self) -> Box<dyn Backend>;
}

impl<T: Backend> Boxed for T {
    fn boxed(self) -> Box<dyn Backend> {
        Box::new(self)
    }
}

impl Boxed for Box<dyn Backend> {
    fn boxed(self) -> Box<dyn Backend> {
        self
    }
}
