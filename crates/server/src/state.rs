// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Composition root: wires C1–C13 together into one running process and
//! hands out the handles the HTTP/WS surface calls into.
//!
//! Grounded on `crates/mux/src/state.rs`'s `Aggregator`-as-shared-handle
//! shape: one `Arc<AppState>` cloned into every axum handler and every
//! background task, each background task owning a `CancellationToken`
//! child of the process-wide one.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::info;

use agentfleet_core::agent::lifecycle::RehydrateCoordinator;
use agentfleet_core::agent::restart::RestartManager;
use agentfleet_core::agent::AgentRegistry;
use agentfleet_core::backend::SessionBackend;
use agentfleet_core::delivery::DeliveryCoordinator;
use agentfleet_core::store::AtomicStore;

use crate::config::ServerConfig;
use crate::crypto::TokenCipher;
use crate::paths::StatePaths;
use crate::queue::MessageQueue;
use crate::reconcile::{ExternalChatBridge, ExternalChatNotification, Reconciler};
use crate::routing::{BroadcastGateway, DeliveryOutcome, ExternalChatAdapter, ResponseRouter};
use crate::scheduler::Scheduler;

/// Placeholder for the real external-chat platform integration, which
/// spec.md §1 names as an out-of-scope external collaborator. Logs instead
/// of posting anywhere; swap in a real [`ExternalChatBridge`]/
/// [`ExternalChatAdapter`] impl to connect an actual chat platform.
struct UnconfiguredExternalChat;

#[async_trait]
impl ExternalChatBridge for UnconfiguredExternalChat {
    async fn send(&self, notification: &ExternalChatNotification) -> Result<(), String> {
        info!(id = %notification.id, channel = %notification.channel, "external-chat bridge unconfigured, dropping notification");
        Ok(())
    }
}

#[async_trait]
impl ExternalChatAdapter for UnconfiguredExternalChat {
    async fn post(&self, meta: &crate::queue::ExternalChatMeta, outcome: &DeliveryOutcome) {
        info!(channel = %meta.channel, delivered = outcome.delivered, "external-chat adapter unconfigured, dropping response");
    }
}

pub struct AppState {
    pub config: ServerConfig,
    pub paths: StatePaths,
    pub store: Arc<AtomicStore>,
    pub backend: Arc<SessionBackend>,
    pub registry: Arc<AgentRegistry>,
    pub delivery: Arc<DeliveryCoordinator>,
    pub rehydrate: Arc<RehydrateCoordinator>,
    pub restart: Arc<RestartManager>,
    pub queue: Arc<MessageQueue>,
    pub scheduler: Arc<Scheduler>,
    pub reconciler: Arc<Reconciler>,
    pub router: Arc<ResponseRouter>,
    pub ws_gateway: Arc<BroadcastGateway>,
    pub token_cipher: Arc<TokenCipher>,
    pub shutdown: CancellationToken,
}

impl AppState {
    pub async fn bootstrap(config: ServerConfig) -> anyhow::Result<Arc<Self>> {
        let home = config.home_dir();
        let store = Arc::new(AtomicStore::new());
        store.ensure_dir(&home).await?;
        let paths = StatePaths::new(home);

        let queue = Arc::new(MessageQueue::load(Arc::clone(&store), paths.queue_state()).await);
        let ws_gateway = Arc::new(BroadcastGateway::new());
        let external_chat = Arc::new(UnconfiguredExternalChat);
        let router = Arc::new(ResponseRouter::new(ws_gateway.clone(), external_chat.clone()));
        let reconciler = Arc::new(Reconciler::new(Arc::clone(&store), paths.chat_history(), external_chat));
        let (scheduler, fired_rx) = Scheduler::new();
        let scheduler = Arc::new(scheduler);
        let persisted_jobs: Vec<crate::scheduler::PersistedJob> =
            store.safe_read_json(&paths.scheduled_messages(), Vec::new()).await;
        scheduler.restore(persisted_jobs);
        let token_cipher = Arc::new(TokenCipher::new(config.token_key.as_deref())?);

        let registry = Arc::new(AgentRegistry::new());
        let persisted_roster: Vec<agentfleet_core::agent::AgentRecord> =
            store.safe_read_json(&paths.teams(), Vec::new()).await;
        registry.restore(persisted_roster);

        let state = Arc::new(Self {
            config,
            paths,
            store,
            backend: Arc::new(SessionBackend::new()),
            registry,
            delivery: Arc::new(DeliveryCoordinator::new()),
            rehydrate: Arc::new(RehydrateCoordinator::new()),
            restart: Arc::new(RestartManager::new()),
            queue,
            scheduler,
            reconciler,
            router,
            ws_gateway,
            token_cipher,
            shutdown: CancellationToken::new(),
        });

        state.spawn_background_tasks(fired_rx);
        Ok(state)
    }

    fn spawn_background_tasks(self: &Arc<Self>, fired_rx: tokio::sync::mpsc::UnboundedReceiver<crate::scheduler::FiredJob>) {
        let dispatcher_state = Arc::clone(self);
        tokio::spawn(Scheduler::run_dispatcher(
            fired_rx,
            Arc::clone(&dispatcher_state.queue),
            Arc::clone(&dispatcher_state.backend),
            Arc::clone(&dispatcher_state.registry),
            Arc::clone(&dispatcher_state.delivery),
        ));

        let worker_state = Arc::clone(self);
        let worker_cancel = self.shutdown.clone();
        tokio::spawn(async move {
            worker_state
                .queue
                .run_worker(
                    &worker_state.backend,
                    &worker_state.registry,
                    &worker_state.delivery,
                    &worker_state.router,
                    worker_cancel,
                )
                .await;
        });

        let reconciler = Arc::clone(&self.reconciler);
        let startup_delay = self.config.reconcile_startup_delay();
        let poll_interval = self.config.reconcile_poll_interval();
        let reconcile_cancel = self.shutdown.clone();
        tokio::spawn(async move {
            reconciler.run(startup_delay, poll_interval, reconcile_cancel).await;
        });

        let gateway = Arc::clone(&self.ws_gateway);
        let sweep_cancel = self.shutdown.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(std::time::Duration::from_secs(60));
            loop {
                tokio::select! {
                    _ = sweep_cancel.cancelled() => break,
                    _ = interval.tick() => gateway.sweep_dormant(),
                }
            }
        });

        // teams.json snapshotter: every registry status change (including
        // roster changes from `register`) triggers a full re-write, the
        // same "persist after every mutation" discipline the queue (C10)
        // follows for queue-state.json.
        let registry = Arc::clone(&self.registry);
        let store = Arc::clone(&self.store);
        let teams_path = self.paths.teams();
        let mut events = self.registry.subscribe();
        let roster_cancel = self.shutdown.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = roster_cancel.cancelled() => break,
                    event = events.recv() => {
                        if event.is_err() {
                            break;
                        }
                        let snapshot = registry.list();
                        if let Err(e) = store.atomic_write_json(&teams_path, &snapshot).await {
                            tracing::warn!(err = %e, "failed to persist teams.json");
                        }
                    }
                }
            }
        });

        // scheduled-messages.json snapshotter: mirrors the teams.json writer
        // above, keyed off the scheduler's own dirty signal instead of a
        // broadcast subscription since jobs have no equivalent event stream.
        let scheduler = Arc::clone(&self.scheduler);
        let store = Arc::clone(&self.store);
        let jobs_path = self.paths.scheduled_messages();
        let jobs_cancel = self.shutdown.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = jobs_cancel.cancelled() => break,
                    _ = scheduler.changed() => {
                        let snapshot = scheduler.snapshot();
                        if let Err(e) = store.atomic_write_json(&jobs_path, &snapshot).await {
                            tracing::warn!(err = %e, "failed to persist scheduled-messages.json");
                        }
                    }
                }
            }
        });
    }

    /// Signal every background task to wind down: the queue worker
    /// finishes its current item and stops, the reconciler and scheduler
    /// dispatcher loops exit at their next select point.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }
}
