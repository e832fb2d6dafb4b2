// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end smoke tests that spawn the real `agentfleetd` binary and
//! exercise its HTTP and WebSocket surface.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::Message;

use agentfleet_specs::AgentFleetProcess;

const TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::test]
async fn healthz_reports_ok() -> anyhow::Result<()> {
    let proc = AgentFleetProcess::start()?;
    proc.wait_healthy(TIMEOUT).await?;

    let text = reqwest::get(format!("{}/healthz", proc.base_url())).await?.text().await?;
    assert_eq!(text, "ok");
    Ok(())
}

#[tokio::test]
async fn create_session_and_capture_output_over_http() -> anyhow::Result<()> {
    let proc = AgentFleetProcess::start()?;
    proc.wait_healthy(TIMEOUT).await?;

    let client = reqwest::Client::new();
    let resp = client
        .post(format!("{}/api/v1/sessions", proc.base_url()))
        .json(&serde_json::json!({
            "name": "smoke",
            "cwd": "/tmp",
            "command": ["sh", "-c", "echo smoke-marker"],
        }))
        .send()
        .await?;
    assert!(resp.status().is_success());

    let url = format!("{}/api/v1/sessions/smoke/output?lines=20", proc.base_url());
    let deadline = tokio::time::Instant::now() + TIMEOUT;
    loop {
        if tokio::time::Instant::now() > deadline {
            anyhow::bail!("session output never showed expected marker");
        }
        let text = client.get(&url).send().await?.text().await?;
        if text.contains("smoke-marker") {
            return Ok(());
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}

#[tokio::test]
async fn session_ws_streams_pty_output() -> anyhow::Result<()> {
    let proc = AgentFleetProcess::start()?;
    proc.wait_healthy(TIMEOUT).await?;

    let client = reqwest::Client::new();
    client
        .post(format!("{}/api/v1/sessions", proc.base_url()))
        .json(&serde_json::json!({
            "name": "ws-smoke",
            "cwd": "/tmp",
            "command": ["cat"],
        }))
        .send()
        .await?;

    let (mut ws, _) = tokio_tungstenite::connect_async(proc.session_ws_url("ws-smoke")).await?;
    ws.send(Message::Binary(b"ping-over-ws\n".to_vec().into())).await?;

    let deadline = tokio::time::Instant::now() + TIMEOUT;
    loop {
        if tokio::time::Instant::now() > deadline {
            anyhow::bail!("ws stream never echoed input back");
        }
        match tokio::time::timeout(Duration::from_secs(1), ws.next()).await {
            Ok(Some(Ok(Message::Binary(data)))) => {
                if String::from_utf8_lossy(&data).contains("ping-over-ws") {
                    return Ok(());
                }
            }
            Ok(Some(Ok(_))) => continue,
            Ok(Some(Err(e))) => anyhow::bail!("ws error: {e}"),
            Ok(None) => anyhow::bail!("ws stream ended"),
            Err(_) => continue,
        }
    }
}
