// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! External-chat reconciliation (C12): a periodic scan over persisted chat
//! history for `external_chat` notifications stuck `pending`, re-sent
//! through the external-chat bridge up to a bounded attempt count.
//!
//! Grounded on `crates/mux/src/upstream/health.rs`'s periodic-scan-under-a-
//! mutex shape, applied here to pending/delivered/failed notification
//! bookkeeping instead of upstream health probing.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex as AsyncMutex;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use agentfleet_core::store::AtomicStore;

/// A notification is abandoned once it's been pending longer than this,
/// regardless of remaining attempt budget.
pub const MAX_MESSAGE_AGE: Duration = Duration::from_secs(24 * 60 * 60);
/// Attempts allowed before a notification is marked `failed`.
pub const MAX_DELIVERY_ATTEMPTS: u32 = 5;

fn now_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis() as u64).unwrap_or(0)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationStatus {
    Pending,
    Delivered,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExternalChatNotification {
    pub id: String,
    pub channel: String,
    pub thread: Option<String>,
    pub user: Option<String>,
    pub content: String,
    pub status: NotificationStatus,
    pub attempt_count: u32,
    pub error: Option<String>,
    pub created_at_epoch_ms: u64,
    pub updated_at_epoch_ms: u64,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct ChatHistory {
    notifications: Vec<ExternalChatNotification>,
}

/// Bridges a reconstructed notification out to whatever chat platform it
/// targets. Implemented by an external-chat adapter the same way
/// [`crate::routing::ExternalChatAdapter`] is — kept separate because
/// reconciliation fabricates its own outcome type instead of reusing
/// [`crate::routing::DeliveryOutcome`], which assumes a queue item exists.
#[async_trait]
pub trait ExternalChatBridge: Send + Sync {
    async fn send(&self, notification: &ExternalChatNotification) -> Result<(), String>;
}

/// Periodic scanner. A single mutex around the scan body guards against
/// overlapping runs if a tick fires while the previous scan is still
/// in-flight (e.g. a slow external-chat bridge call).
pub struct Reconciler {
    store: Arc<AtomicStore>,
    path: PathBuf,
    bridge: Arc<dyn ExternalChatBridge>,
    scan_lock: AsyncMutex<()>,
}

impl Reconciler {
    pub fn new(store: Arc<AtomicStore>, path: PathBuf, bridge: Arc<dyn ExternalChatBridge>) -> Self {
        Self { store, path, bridge, scan_lock: AsyncMutex::new(()) }
    }

    /// Record a new `pending` notification for a later scan to pick up.
    pub async fn record_pending(&self, notification: ExternalChatNotification) {
        let _guard = self.scan_lock.lock().await;
        let mut history = self.store.safe_read_json(&self.path, ChatHistory::default()).await;
        history.notifications.push(notification);
        if let Err(e) = self.store.atomic_write_json(&self.path, &history).await {
            warn!(err = %e, "failed to persist external-chat notification");
        }
    }

    /// Run the startup-delay-then-fixed-interval loop until `cancel` fires.
    pub async fn run(self: Arc<Self>, startup_delay: Duration, poll_interval: Duration, cancel: CancellationToken) {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(startup_delay) => {}
        }

        let mut interval = tokio::time::interval(poll_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = interval.tick() => self.scan_once().await,
            }
        }
    }

    /// One scan pass: pending + not-yet-expired + under the attempt budget
    /// get (re)sent; expired or budget-exhausted entries are marked
    /// `failed` in place.
    pub async fn scan_once(&self) {
        let _guard = self.scan_lock.lock().await;
        let mut history = self.store.safe_read_json(&self.path, ChatHistory::default()).await;

        let mut changed = false;
        for notification in &mut history.notifications {
            if notification.status != NotificationStatus::Pending {
                continue;
            }
            let age_ms = now_ms().saturating_sub(notification.created_at_epoch_ms);
            if age_ms >= MAX_MESSAGE_AGE.as_millis() as u64 {
                notification.status = NotificationStatus::Failed;
                notification.error = Some("exceeded maximum pending age".to_string());
                notification.updated_at_epoch_ms = now_ms();
                changed = true;
                continue;
            }
            if notification.attempt_count >= MAX_DELIVERY_ATTEMPTS {
                notification.status = NotificationStatus::Failed;
                notification.error = Some("exceeded maximum delivery attempts".to_string());
                notification.updated_at_epoch_ms = now_ms();
                changed = true;
                continue;
            }

            notification.attempt_count += 1;
            notification.updated_at_epoch_ms = now_ms();
            changed = true;
            match self.bridge.send(notification).await {
                Ok(()) => {
                    notification.status = NotificationStatus::Delivered;
                    notification.error = None;
                    info!(id = %notification.id, "external-chat notification delivered");
                }
                Err(e) => {
                    warn!(id = %notification.id, err = %e, attempt = notification.attempt_count, "external-chat delivery attempt failed");
                    notification.error = Some(e);
                    if notification.attempt_count >= MAX_DELIVERY_ATTEMPTS {
                        notification.status = NotificationStatus::Failed;
                    }
                }
            }
        }

        if changed {
            if let Err(e) = self.store.atomic_write_json(&self.path, &history).await {
                warn!(err = %e, "failed to persist reconciliation scan results");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingBridge {
        calls: AtomicUsize,
        fail_until: usize,
    }

    #[async_trait]
    impl ExternalChatBridge for CountingBridge {
        async fn send(&self, _notification: &ExternalChatNotification) -> Result<(), String> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.fail_until {
                Err("simulated failure".to_string())
            } else {
                Ok(())
            }
        }
    }

    fn sample(id: &str) -> ExternalChatNotification {
        ExternalChatNotification {
            id: id.to_string(),
            channel: "general".to_string(),
            thread: None,
            user: None,
            content: "hello".to_string(),
            status: NotificationStatus::Pending,
            attempt_count: 0,
            error: None,
            created_at_epoch_ms: now_ms(),
            updated_at_epoch_ms: now_ms(),
        }
    }

    #[tokio::test]
    async fn pending_notification_is_delivered_on_first_successful_scan() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = Arc::new(AtomicStore::new());
        let path = dir.path().join("chat-history.json");
        let bridge = Arc::new(CountingBridge { calls: AtomicUsize::new(0), fail_until: 0 });
        let reconciler = Reconciler::new(Arc::clone(&store), path.clone(), bridge);

        reconciler.record_pending(sample("n1")).await;
        reconciler.scan_once().await;

        let history: ChatHistory = store.safe_read_json(&path, ChatHistory::default()).await;
        assert_eq!(history.notifications[0].status, NotificationStatus::Delivered);
        assert_eq!(history.notifications[0].attempt_count, 1);
    }

    #[tokio::test]
    async fn exhausting_attempt_budget_marks_failed() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = Arc::new(AtomicStore::new());
        let path = dir.path().join("chat-history.json");
        let bridge = Arc::new(CountingBridge { calls: AtomicUsize::new(0), fail_until: usize::MAX });
        let reconciler = Reconciler::new(Arc::clone(&store), path.clone(), bridge);

        reconciler.record_pending(sample("n1")).await;
        for _ in 0..MAX_DELIVERY_ATTEMPTS {
            reconciler.scan_once().await;
        }

        let history: ChatHistory = store.safe_read_json(&path, ChatHistory::default()).await;
        assert_eq!(history.notifications[0].status, NotificationStatus::Failed);
        assert_eq!(history.notifications[0].attempt_count, MAX_DELIVERY_ATTEMPTS);
    }
}
