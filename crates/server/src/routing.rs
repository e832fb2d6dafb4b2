// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Suspended-writes coordinator (C13): routes a completed queue item's
//! response back to whichever source originated it.
//!
//! Grounded on `crates/mux/src/transport/ws_mux.rs`'s per-conversation
//! WebSocket fan-out (there: aggregated session events out to `/ws/mux`
//! clients; here: a queue item's response out to the web-chat client that
//! is still waiting on it).

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{broadcast, oneshot};

use crate::queue::{ExternalChatMeta, QueueSource, QueuedMessage};

/// Outcome of processing one queued message, handed to the router.
#[derive(Debug, Clone)]
pub struct DeliveryOutcome {
    pub delivered: bool,
    pub response: Option<String>,
    pub error: Option<String>,
    /// Number of send attempts the delivery took. `0` when delivery never
    /// got far enough to attempt a send (e.g. the target session was gone).
    pub attempts: u32,
}

/// Sink for `web_chat`-sourced responses, keyed by conversation id.
/// Implemented by the axum WebSocket layer in `crate::ws`.
pub trait WebSocketGateway: Send + Sync {
    fn emit(&self, conversation_id: &str, outcome: &DeliveryOutcome);
}

/// Sink for `external_chat`-sourced responses whose in-memory resolve
/// callback didn't survive a restart, reconstructed from stored routing
/// metadata instead.
#[async_trait]
pub trait ExternalChatAdapter: Send + Sync {
    async fn post(&self, meta: &ExternalChatMeta, outcome: &DeliveryOutcome);
}

/// Default in-process WebSocket gateway: a broadcast channel per
/// conversation id, lazily created. Subscribers (one per open WS
/// connection) drop their receiver on disconnect; dormant conversation
/// channels are swept out on a bounded schedule by the caller.
pub struct BroadcastGateway {
    channels: Mutex<HashMap<String, broadcast::Sender<DeliveryOutcome>>>,
}

impl Default for BroadcastGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl BroadcastGateway {
    pub fn new() -> Self {
        Self { channels: Mutex::new(HashMap::new()) }
    }

    pub fn subscribe(&self, conversation_id: &str) -> broadcast::Receiver<DeliveryOutcome> {
        let mut channels = self.channels.lock();
        channels.entry(conversation_id.to_string()).or_insert_with(|| broadcast::channel(32).0).subscribe()
    }

    /// Drop channels with no subscribers, bounding unbounded growth from a
    /// long-lived server seeing many distinct conversations.
    pub fn sweep_dormant(&self) {
        let mut channels = self.channels.lock();
        channels.retain(|_, tx| tx.receiver_count() > 0);
    }
}

impl WebSocketGateway for BroadcastGateway {
    fn emit(&self, conversation_id: &str, outcome: &DeliveryOutcome) {
        let channels = self.channels.lock();
        if let Some(tx) = channels.get(conversation_id) {
            let _ = tx.send(outcome.clone());
        }
    }
}

/// Routes a completed queue item's outcome to its originating source.
pub struct ResponseRouter {
    ws_gateway: Arc<dyn WebSocketGateway>,
    external_chat: Arc<dyn ExternalChatAdapter>,
}

impl ResponseRouter {
    pub fn new(ws_gateway: Arc<dyn WebSocketGateway>, external_chat: Arc<dyn ExternalChatAdapter>) -> Self {
        Self { ws_gateway, external_chat }
    }

    /// Route `outcome` to wherever `item.source` says it came from. The
    /// in-memory resolve callback (if the item still carries one) takes
    /// priority over the persisted routing metadata.
    pub async fn route(&self, item: &QueuedMessage, outcome: DeliveryOutcome) {
        match &item.source {
            QueueSource::WebChat { meta } => {
                self.ws_gateway.emit(&meta.conversation_id, &outcome);
            }
            QueueSource::ExternalChat { meta, resolve } => {
                let mut resolved_via_callback = false;
                if let Some(tx) = resolve.lock().take() {
                    resolved_via_callback = tx.send(outcome.clone()).is_ok();
                }
                if !resolved_via_callback {
                    self.external_chat.post(meta, &outcome).await;
                }
            }
            QueueSource::SystemEvent { .. } => {
                // Discarded per spec: nobody is waiting on a system event's response.
            }
        }
    }
}

/// Resolve callback wrapper: `oneshot::Sender` isn't `Clone`/persistable, so
/// it's wrapped for interior mutability and stripped entirely on
/// serialization (see [`QueueSource`]'s `#[serde(skip)]` field).
pub type ResolveCallback = Mutex<Option<oneshot::Sender<DeliveryOutcome>>>;
