// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized message queue (C10): a single-consumer FIFO across
//! heterogeneous sources (web chat, external chat bridge, system events),
//! persisted after every mutation and recovered on restart.
//!
//! Wholly new relative to the teacher (it has no cross-source FIFO of its
//! own); grounded structurally on `crates/mux/src/state.rs`'s `Aggregator`
//! (broadcast + cache-by-key) for the persist-and-notify shape, and on
//! [`agentfleet_core::store::AtomicStore`] for every mutation's write path.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::Mutex as SyncMutex;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, oneshot, Notify};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use agentfleet_core::agent::AgentRegistry;
use agentfleet_core::backend::SessionBackend;
use agentfleet_core::delivery::{DeliveryCoordinator, DeliveryFailure, DeliveryOptions, MAX_DELIVERY_ATTEMPTS};
use agentfleet_core::store::AtomicStore;

use crate::routing::{DeliveryOutcome, ResolveCallback, ResponseRouter};

/// History retained past completion/failure, most-recent-first.
pub const HISTORY_LIMIT: usize = 200;
/// How many times an "agent not ready" requeue is allowed before the item
/// is given up on and marked failed.
pub const MAX_NOT_READY_RETRIES: u32 = 5;
/// Pause before an "agent not ready" item is put back on the tail.
pub const NOT_READY_REQUEUE_DELAY: std::time::Duration = std::time::Duration::from_millis(500);

fn now_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis() as u64).unwrap_or(0)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebChatMeta {
    pub conversation_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExternalChatMeta {
    pub channel: String,
    pub thread: Option<String>,
    pub user: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemEventMeta {
    pub kind: String,
}

/// Source-specific routing metadata (Design Note in spec.md §9: "dynamic
/// shape objects ... become three concrete record variants").
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum QueueSource {
    WebChat { meta: WebChatMeta },
    ExternalChat {
        meta: ExternalChatMeta,
        /// In-memory-only: stripped on persistence, absent after a
        /// restart (the external-chat adapter takes over in that case).
        #[serde(skip, default)]
        resolve: ResolveCallback,
    },
    SystemEvent { meta: SystemEventMeta },
}

impl Clone for QueueSource {
    fn clone(&self) -> Self {
        match self {
            Self::WebChat { meta } => Self::WebChat { meta: meta.clone() },
            Self::ExternalChat { meta, .. } => {
                // The resolve callback is single-use and not meaningfully
                // cloneable; a clone of an in-flight item (e.g. for a
                // history snapshot) carries no callback of its own.
                Self::ExternalChat { meta: meta.clone(), resolve: ResolveCallback::default() }
            }
            Self::SystemEvent { meta } => Self::SystemEvent { meta: meta.clone() },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueItemStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueuedMessage {
    pub id: String,
    pub content: String,
    /// Agent registry key (`"{team_id}:{member_id}"`) this message targets.
    pub target: String,
    pub source: QueueSource,
    pub status: QueueItemStatus,
    pub retry_count: u32,
    pub response: Option<String>,
    pub error: Option<String>,
    pub created_at_epoch_ms: u64,
    pub updated_at_epoch_ms: u64,
}

/// What a caller supplies to [`MessageQueue::enqueue`].
pub struct EnqueueInput {
    pub content: String,
    pub target: String,
    pub source: QueueSource,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueueTotals {
    pub enqueued: u64,
    pub completed: u64,
    pub failed: u64,
    pub cancelled: u64,
}

/// On-disk shape of the queue, written after every mutation.
#[derive(Debug, Default, Serialize, Deserialize)]
struct PersistedQueueState {
    pending: VecDeque<QueuedMessage>,
    current: Option<QueuedMessage>,
    #[serde(default)]
    history: VecDeque<QueuedMessage>,
    #[serde(default)]
    totals: QueueTotals,
}

/// Public snapshot returned by [`MessageQueue::status`].
#[derive(Debug, Clone, Serialize)]
pub struct QueueStatus {
    pub pending: Vec<QueuedMessage>,
    pub current: Option<QueuedMessage>,
    pub history: Vec<QueuedMessage>,
    pub totals: QueueTotals,
}

/// Events emitted on every queue mutation, for observers (the WS gateway
/// among them).
#[derive(Debug, Clone)]
pub enum QueueEvent {
    Enqueued(String),
    Completed(String),
    Failed(String),
    Cancelled(String),
}

struct Inner {
    state: PersistedQueueState,
}

/// Single FIFO of items across sources; exactly one worker consumes.
pub struct MessageQueue {
    inner: SyncMutex<Inner>,
    store: Arc<AtomicStore>,
    path: PathBuf,
    notify: Notify,
    events: broadcast::Sender<QueueEvent>,
}

impl MessageQueue {
    /// Read persisted state back, demoting any in-flight item to the
    /// pending head (the single-worker guarantee means it can't have been
    /// doubly processed).
    pub async fn load(store: Arc<AtomicStore>, path: PathBuf) -> Self {
        let mut state = store.safe_read_json(&path, PersistedQueueState::default()).await;
        if let Some(stranded) = state.current.take() {
            warn!(id = %stranded.id, "demoting in-flight queue item to pending head after restart");
            let mut restored = stranded;
            restored.status = QueueItemStatus::Pending;
            restored.updated_at_epoch_ms = now_ms();
            state.pending.push_front(restored);
        }
        let (events, _) = broadcast::channel(256);
        let queue = Self { inner: SyncMutex::new(Inner { state }), store, path, notify: Notify::new(), events };
        if !queue.inner.lock().state.pending.is_empty() {
            queue.notify.notify_one();
        }
        queue
    }

    pub fn subscribe(&self) -> broadcast::Receiver<QueueEvent> {
        self.events.subscribe()
    }

    /// Append `input` to the tail of the pending queue and persist.
    pub async fn enqueue(&self, input: EnqueueInput) -> String {
        let id = uuid::Uuid::new_v4().to_string();
        let item = QueuedMessage {
            id: id.clone(),
            content: input.content,
            target: input.target,
            source: input.source,
            status: QueueItemStatus::Pending,
            retry_count: 0,
            response: None,
            error: None,
            created_at_epoch_ms: now_ms(),
            updated_at_epoch_ms: now_ms(),
        };

        {
            let mut inner = self.inner.lock();
            inner.state.pending.push_back(item);
            inner.state.totals.enqueued += 1;
        }
        self.persist().await;
        self.notify.notify_one();
        let _ = self.events.send(QueueEvent::Enqueued(id.clone()));
        info!(id = %id, "message enqueued");
        id
    }

    /// Register an in-memory resolve callback for an already-enqueued
    /// `external_chat` item, used by callers that want a direct reply
    /// future instead of polling [`Self::status`].
    pub fn attach_resolve_callback(&self, id: &str) -> Option<oneshot::Receiver<DeliveryOutcome>> {
        let mut inner = self.inner.lock();
        let item = inner.state.pending.iter_mut().find(|m| m.id == id)?;
        if let QueueSource::ExternalChat { resolve, .. } = &mut item.source {
            let (tx, rx) = oneshot::channel();
            *resolve.lock() = Some(tx);
            Some(rx)
        } else {
            None
        }
    }

    /// Cancel a pending item by id. The currently-processing item cannot
    /// be cancelled this way — only abandoned at the delivery timeout.
    pub async fn cancel(&self, id: &str) -> bool {
        let cancelled = {
            let mut inner = self.inner.lock();
            if let Some(pos) = inner.state.pending.iter().position(|m| m.id == id) {
                let mut item = inner.state.pending.remove(pos).expect("position just found");
                item.status = QueueItemStatus::Cancelled;
                item.updated_at_epoch_ms = now_ms();
                inner.state.totals.cancelled += 1;
                push_history(&mut inner.state.history, item);
                true
            } else {
                false
            }
        };
        if cancelled {
            self.persist().await;
            let _ = self.events.send(QueueEvent::Cancelled(id.to_string()));
        }
        cancelled
    }

    pub fn status(&self) -> QueueStatus {
        let inner = self.inner.lock();
        QueueStatus {
            pending: inner.state.pending.iter().cloned().collect(),
            current: inner.state.current.clone(),
            history: inner.state.history.iter().cloned().collect(),
            totals: inner.state.totals.clone(),
        }
    }

    async fn persist(&self) {
        // Non-serializable metadata (resolve callbacks) is stripped by
        // `QueueSource`'s `#[serde(skip)]` field, not here; we just
        // serialize the state as-is.
        let snapshot = {
            let inner = self.inner.lock();
            serde_json::to_vec_pretty(&inner.state)
        };
        match snapshot {
            Ok(bytes) => {
                if let Err(e) = self.store.atomic_write(&self.path, &bytes).await {
                    warn!(err = %e, "failed to persist queue state");
                }
            }
            Err(e) => warn!(err = %e, "failed to serialize queue state"),
        }
    }

    /// Pop the head of the pending queue and mark it processing, or wait
    /// for one to arrive. Returns `None` only when `cancel` fires.
    async fn next(&self, cancel: &CancellationToken) -> Option<QueuedMessage> {
        loop {
            {
                let mut inner = self.inner.lock();
                if let Some(item) = inner.state.pending.pop_front() {
                    let mut item = item;
                    item.status = QueueItemStatus::Processing;
                    item.updated_at_epoch_ms = now_ms();
                    inner.state.current = Some(item.clone());
                    return Some(item);
                }
            }
            tokio::select! {
                _ = cancel.cancelled() => return None,
                _ = self.notify.notified() => {}
            }
        }
    }

    async fn finish(&self, mut item: QueuedMessage, outcome: Result<(String, u32), DeliveryFailure>) -> DeliveryOutcome {
        let result = match outcome {
            Ok((response, attempts)) => {
                item.status = QueueItemStatus::Completed;
                item.response = Some(response.clone());
                DeliveryOutcome { delivered: true, response: Some(response), error: None, attempts }
            }
            Err(failure) => {
                item.status = QueueItemStatus::Failed;
                item.error = Some(failure.to_string());
                DeliveryOutcome { delivered: false, response: None, error: Some(failure.to_string()), attempts: 0 }
            }
        };
        item.updated_at_epoch_ms = now_ms();

        {
            let mut inner = self.inner.lock();
            inner.state.current = None;
            match item.status {
                QueueItemStatus::Completed => inner.state.totals.completed += 1,
                QueueItemStatus::Failed => inner.state.totals.failed += 1,
                _ => {}
            }
            push_history(&mut inner.state.history, item.clone());
        }
        self.persist().await;

        let _ = self.events.send(match item.status {
            QueueItemStatus::Completed => QueueEvent::Completed(item.id.clone()),
            _ => QueueEvent::Failed(item.id.clone()),
        });

        result
    }

    /// Put a not-yet-ready item back on the tail with an incremented
    /// retry count, capped at [`MAX_NOT_READY_RETRIES`].
    async fn requeue_not_ready(&self, mut item: QueuedMessage) -> bool {
        item.retry_count += 1;
        item.updated_at_epoch_ms = now_ms();
        if item.retry_count > MAX_NOT_READY_RETRIES {
            return false;
        }
        item.status = QueueItemStatus::Pending;
        {
            let mut inner = self.inner.lock();
            inner.state.current = None;
            inner.state.pending.push_back(item);
        }
        self.persist().await;
        self.notify.notify_one();
        true
    }

    /// Run the single consumer loop until `cancel` fires. Stops accepting
    /// new work once cancellation is requested but finishes whatever item
    /// is already in flight first.
    pub async fn run_worker(
        self: &Arc<Self>,
        backend: &SessionBackend,
        registry: &AgentRegistry,
        delivery: &DeliveryCoordinator,
        router: &ResponseRouter,
        cancel: CancellationToken,
    ) {
        loop {
            let Some(item) = self.next(&cancel).await else { break };
            let outcome = self.process_one(backend, registry, delivery, &item).await;

            match outcome {
                ProcessOutcome::Done(result) => {
                    let delivery_outcome = self.finish(item.clone(), result).await;
                    router.route(&item, delivery_outcome).await;
                }
                ProcessOutcome::NotReady => {
                    if !self.requeue_not_ready(item.clone()).await {
                        let delivery_outcome =
                            self.finish(item.clone(), Err(DeliveryFailure::MaxRetriesExceeded)).await;
                        router.route(&item, delivery_outcome).await;
                    }
                }
            }

            if cancel.is_cancelled() {
                break;
            }
        }
    }

    async fn process_one(
        &self,
        backend: &SessionBackend,
        registry: &AgentRegistry,
        delivery: &DeliveryCoordinator,
        item: &QueuedMessage,
    ) -> ProcessOutcome {
        let record = match registry.get(&item.target) {
            Some(r) => r,
            None => return ProcessOutcome::Done(Err(DeliveryFailure::SessionGone)),
        };
        let Some(session_name) = record.session_name else {
            return ProcessOutcome::NotReady;
        };

        let options = DeliveryOptions {
            prompt_pattern: record.runtime_type.ready_pattern().to_string(),
            confirmation_pattern: record.runtime_type.delivery_confirmation_pattern().to_string(),
            clear_line_first: false,
            max_attempts: MAX_DELIVERY_ATTEMPTS,
        };

        match delivery.deliver(backend, &session_name, &item.content, &options).await {
            Ok(attempts) => {
                let response = backend.capture_output(&session_name, 50).await.unwrap_or_default();
                ProcessOutcome::Done(Ok((response, attempts)))
            }
            Err(DeliveryFailure::PromptNotReady) => ProcessOutcome::NotReady,
            Err(other) => ProcessOutcome::Done(Err(other)),
        }
    }
}

enum ProcessOutcome {
    Done(Result<(String, u32), DeliveryFailure>),
    NotReady,
}

fn push_history(history: &mut VecDeque<QueuedMessage>, item: QueuedMessage) {
    history.push_front(item);
    while history.len() > HISTORY_LIMIT {
        history.pop_back();
    }
}

#[cfg(test)]
#[path = "queue_tests.rs"]
mod tests;
