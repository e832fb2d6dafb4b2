// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Test harness for end-to-end binary smoke tests.
//!
//! Spawns the real `agentfleetd` binary as a subprocess and exercises it
//! over HTTP and WebSocket, the only two transports it exposes.

use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::Once;
use std::time::Duration;

static CRYPTO_INIT: Once = Once::new();

/// Install the ring crypto provider for reqwest/rustls.
/// Safe to call multiple times — only the first call has effect.
pub fn ensure_crypto() {
    CRYPTO_INIT.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}

/// Resolve the path to the compiled `agentfleetd` binary.
pub fn agentfleetd_binary() -> PathBuf {
    let manifest = Path::new(env!("CARGO_MANIFEST_DIR"));
    // tests/specs -> tests -> workspace root
    let workspace = manifest.parent().and_then(|p| p.parent()).unwrap_or(manifest);
    workspace.join("target").join("debug").join("agentfleetd")
}

/// Find a free TCP port by binding to :0 then releasing.
pub fn free_port() -> anyhow::Result<u16> {
    let listener = std::net::TcpListener::bind("127.0.0.1:0")?;
    Ok(listener.local_addr()?.port())
}

/// A running `agentfleetd` process that is killed on drop.
pub struct AgentFleetProcess {
    child: Child,
    port: u16,
    _home: tempfile::TempDir,
}

impl AgentFleetProcess {
    /// Spawn `agentfleetd` against a fresh temporary state directory and a
    /// free port, with auth disabled.
    pub fn start() -> anyhow::Result<Self> {
        ensure_crypto();
        let binary = agentfleetd_binary();
        anyhow::ensure!(binary.exists(), "agentfleetd binary not found at {}", binary.display());

        let port = free_port()?;
        let home = tempfile::tempdir()?;

        let child = Command::new(&binary)
            .env("AGENTFLEET_HOST", "127.0.0.1")
            .env("AGENTFLEET_PORT", port.to_string())
            .env("AGENTFLEET_HOME", home.path())
            .env("RUST_LOG", "warn")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()?;

        Ok(Self { child, port, _home: home })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Base URL for HTTP requests.
    pub fn base_url(&self) -> String {
        format!("http://127.0.0.1:{}", self.port)
    }

    /// WebSocket URL for a session's PTY stream.
    pub fn session_ws_url(&self, name: &str) -> String {
        format!("ws://127.0.0.1:{}/ws/sessions/{name}", self.port)
    }

    /// Poll `/healthz` until it responds.
    pub async fn wait_healthy(&self, timeout: Duration) -> anyhow::Result<()> {
        let client = reqwest::Client::new();
        let url = format!("{}/healthz", self.base_url());
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if tokio::time::Instant::now() > deadline {
                anyhow::bail!("agentfleetd did not become healthy within {timeout:?}");
            }
            if let Ok(resp) = client.get(&url).send().await {
                if resp.status().is_success() {
                    return Ok(());
                }
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }
}

impl Drop for AgentFleetProcess {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}
