// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Composition root and thin HTTP/WS surface for the orchestrator
//! (spec.md's "external collaborators" stand-in, kept intentionally thin).

pub mod config;
pub mod crypto;
pub mod error;
pub mod http;
pub mod paths;
pub mod queue;
pub mod reconcile;
pub mod routing;
pub mod scheduler;
pub mod state;
pub mod ws;

use std::sync::Arc;

use tracing::info;

use config::ServerConfig;
use state::AppState;

/// Build the composition root and serve until `ctrl_c` (or another
/// shutdown signal the caller wires up) fires.
pub async fn run(config: ServerConfig) -> anyhow::Result<()> {
    let addr = format!("{}:{}", config.host, config.port);
    let state = AppState::bootstrap(config).await?;
    let router = http::build_router(Arc::clone(&state));

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(addr = %addr, "agentfleetd listening");

    axum::serve(listener, router).with_graceful_shutdown(shutdown_signal(Arc::clone(&state))).await?;

    Ok(())
}

async fn shutdown_signal(state: Arc<AppState>) {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::warn!(err = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    info!("shutdown signal received, draining background tasks");
    state.shutdown();
}
