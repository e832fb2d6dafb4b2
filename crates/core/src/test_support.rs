// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory fakes shared across this crate's unit tests.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::mpsc;

use crate::backend::SessionBackend;
use crate::error::CoreResult;
use crate::pty::{Backend, ExitStatus, SignalHandle};
use crate::runtime::{RuntimeAdapter, RuntimeType, StartConfig};
use crate::session::PtySession;

/// A backend that echoes every byte written to it back out, and exits
/// once its signal handle has been invoked (simulating delivery of a
/// termination signal) or the input channel goes quiet.
pub struct EchoBackend {
    exited: Arc<AtomicBool>,
}

impl EchoBackend {
    pub fn new() -> Self {
        Self { exited: Arc::new(AtomicBool::new(false)) }
    }
}

impl Default for EchoBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl Backend for EchoBackend {
    fn run(
        &mut self,
        output_tx: mpsc::Sender<Bytes>,
        mut input_rx: mpsc::Receiver<Bytes>,
        mut resize_rx: mpsc::Receiver<(u16, u16)>,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<ExitStatus>> + Send + '_>> {
        let exited = Arc::clone(&self.exited);
        Box::pin(async move {
            loop {
                if exited.load(Ordering::Acquire) {
                    return Ok(ExitStatus { code: Some(0), signal: None });
                }
                tokio::select! {
                    biased;
                    data = input_rx.recv() => {
                        match data {
                            Some(bytes) => { let _ = output_tx.send(bytes).await; }
                            None => return Ok(ExitStatus { code: Some(0), signal: None }),
                        }
                    }
                    Some(_) = resize_rx.recv() => {}
                    _ = tokio::time::sleep(std::time::Duration::from_millis(20)) => {}
                }
            }
        })
    }

    fn child_pid(&self) -> Option<u32> {
        Some(4242)
    }

    fn signal_handle(&self) -> SignalHandle {
        let exited = Arc::clone(&self.exited);
        Arc::new(move |_signal: nix::sys::signal::Signal| -> anyhow::Result<()> {
            exited.store(true, Ordering::Release);
            Ok(())
        })
    }
}

/// A [`RuntimeAdapter`] that registers an [`EchoBackend`] session instead
/// of forking a real CLI, for exercising lifecycle/restart logic without
/// depending on an actual `claude`/`gemini`/`codex` binary being present.
pub struct FakeRuntimeAdapter {
    runtime_type: RuntimeType,
}

impl FakeRuntimeAdapter {
    pub fn new(runtime_type: RuntimeType) -> Self {
        Self { runtime_type }
    }
}

#[async_trait::async_trait]
impl RuntimeAdapter for FakeRuntimeAdapter {
    fn runtime_type(&self) -> RuntimeType {
        self.runtime_type
    }

    async fn start(&self, backend: &SessionBackend, config: StartConfig) -> CoreResult<()> {
        let session = Arc::new(PtySession::spawn(config.session_name, config.cwd, EchoBackend::new(), 4096));
        backend.register(session).await
    }
}
