// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio_util::sync::CancellationToken;

use agentfleet_core::agent::{AgentIdentity, AgentRegistry, AgentRole};
use agentfleet_core::backend::SessionBackend;
use agentfleet_core::delivery::DeliveryCoordinator;
use agentfleet_core::runtime::RuntimeType;
use agentfleet_core::session::PtySession;
use agentfleet_core::store::AtomicStore;
use agentfleet_core::test_support::EchoBackend;

use super::*;
use crate::routing::{BroadcastGateway, ExternalChatAdapter};

struct DroppingExternalChat;

#[async_trait]
impl ExternalChatAdapter for DroppingExternalChat {
    async fn post(&self, _meta: &ExternalChatMeta, _outcome: &DeliveryOutcome) {}
}

fn test_router() -> Arc<ResponseRouter> {
    Arc::new(ResponseRouter::new(Arc::new(BroadcastGateway::new()), Arc::new(DroppingExternalChat)))
}

async fn fresh_queue() -> (Arc<MessageQueue>, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("queue-state.json");
    let queue = Arc::new(MessageQueue::load(Arc::new(AtomicStore::new()), path).await);
    (queue, dir)
}

fn web_chat_input(content: &str, target: &str, conversation_id: &str) -> EnqueueInput {
    EnqueueInput {
        content: content.to_string(),
        target: target.to_string(),
        source: QueueSource::WebChat { meta: WebChatMeta { conversation_id: conversation_id.to_string() } },
    }
}

#[tokio::test]
async fn enqueue_preserves_fifo_order() {
    let (queue, _dir) = fresh_queue().await;
    let first = queue.enqueue(web_chat_input("one", "t", "c")).await;
    let second = queue.enqueue(web_chat_input("two", "t", "c")).await;
    let third = queue.enqueue(web_chat_input("three", "t", "c")).await;

    let cancel = CancellationToken::new();
    let popped_first = queue.next(&cancel).await.unwrap();
    assert_eq!(popped_first.id, first);
    queue.finish(popped_first, Ok(("ok".to_string(), 1))).await;

    let popped_second = queue.next(&cancel).await.unwrap();
    assert_eq!(popped_second.id, second);
    queue.finish(popped_second, Ok(("ok".to_string(), 1))).await;

    let popped_third = queue.next(&cancel).await.unwrap();
    assert_eq!(popped_third.id, third);
    queue.finish(popped_third, Ok(("ok".to_string(), 1))).await;
}

#[tokio::test]
async fn at_most_one_item_is_current_between_next_and_finish() {
    let (queue, _dir) = fresh_queue().await;
    queue.enqueue(web_chat_input("one", "t", "c")).await;
    queue.enqueue(web_chat_input("two", "t", "c")).await;

    let cancel = CancellationToken::new();
    let item = queue.next(&cancel).await.unwrap();

    let status = queue.status();
    assert!(status.current.is_some());
    assert_eq!(status.current.as_ref().unwrap().id, item.id);
    assert_eq!(status.pending.len(), 1, "the second item stays pending, not current");

    queue.finish(item, Ok(("done".to_string(), 1))).await;
    assert!(queue.status().current.is_none());
}

#[tokio::test]
async fn cancel_removes_a_pending_item_and_records_history() {
    let (queue, _dir) = fresh_queue().await;
    let id = queue.enqueue(web_chat_input("one", "t", "c")).await;

    assert!(queue.cancel(&id).await);
    assert!(!queue.cancel(&id).await, "cancelling twice is a no-op");

    let status = queue.status();
    assert!(status.pending.is_empty());
    assert_eq!(status.history.len(), 1);
    assert_eq!(status.history[0].status, QueueItemStatus::Cancelled);
    assert_eq!(status.totals.cancelled, 1);
}

#[tokio::test]
async fn cancel_cannot_remove_the_currently_processing_item() {
    let (queue, _dir) = fresh_queue().await;
    let id = queue.enqueue(web_chat_input("one", "t", "c")).await;

    let cancel = CancellationToken::new();
    let item = queue.next(&cancel).await.unwrap();
    assert_eq!(item.id, id);

    assert!(!queue.cancel(&id).await, "a processing item is no longer in the pending queue");
}

#[tokio::test]
async fn load_demotes_a_stranded_current_item_back_to_the_pending_head() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("queue-state.json");
    let store = Arc::new(AtomicStore::new());

    let stranded = QueuedMessage {
        id: "stranded-1".to_string(),
        content: "mid-flight when the process died".to_string(),
        target: "team:member".to_string(),
        source: QueueSource::WebChat { meta: WebChatMeta { conversation_id: "c".to_string() } },
        status: QueueItemStatus::Processing,
        retry_count: 0,
        response: None,
        error: None,
        created_at_epoch_ms: 1,
        updated_at_epoch_ms: 1,
    };
    let persisted = PersistedQueueState {
        pending: VecDeque::new(),
        current: Some(stranded),
        history: VecDeque::new(),
        totals: QueueTotals::default(),
    };
    store.atomic_write_json(&path, &persisted).await.unwrap();

    let queue = MessageQueue::load(store, path).await;
    let status = queue.status();
    assert!(status.current.is_none());
    assert_eq!(status.pending.len(), 1);
    assert_eq!(status.pending[0].id, "stranded-1");
    assert_eq!(status.pending[0].status, QueueItemStatus::Pending);
}

#[tokio::test]
async fn requeue_not_ready_increments_retry_count_and_gives_up_past_the_budget() {
    let (queue, _dir) = fresh_queue().await;
    queue.enqueue(web_chat_input("one", "t", "c")).await;

    let cancel = CancellationToken::new();
    let mut item = queue.next(&cancel).await.unwrap();

    for expected_retry in 1..=MAX_NOT_READY_RETRIES {
        assert!(queue.requeue_not_ready(item).await, "retry {expected_retry} should still be within budget");
        item = queue.next(&cancel).await.unwrap();
        assert_eq!(item.retry_count, expected_retry);
    }

    assert!(!queue.requeue_not_ready(item).await, "exceeding the retry budget gives up on the item");
}

async fn register_claude_member(registry: &AgentRegistry, session_name: &str) -> String {
    let identity =
        AgentIdentity { team_id: "team".to_string(), member_id: "worker".to_string(), role: AgentRole::Member };
    let key = identity.key();
    registry.register(identity, RuntimeType::ClaudeCode);
    registry.mark_starting(&key, session_name).unwrap();
    registry.mark_active(&key).unwrap();
    key
}

#[tokio::test]
async fn run_worker_delivers_a_message_end_to_end_and_persists_the_outcome() {
    let (queue, _dir) = fresh_queue().await;
    let backend = SessionBackend::new();
    let registry = AgentRegistry::new();
    let delivery = DeliveryCoordinator::new();
    let router = test_router();

    let key = register_claude_member(&registry, "queue-e2e-session").await;
    let session = Arc::new(PtySession::spawn("queue-e2e-session", "/tmp", EchoBackend::new(), 4096));
    backend.register(session.clone()).await.unwrap();
    session.write(Bytes::from_static(b"? for shortcuts\n")).await.unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    queue.enqueue(web_chat_input("please run: Thinking about it", &key, "conv-1")).await;

    let cancel = CancellationToken::new();
    let worker_cancel = cancel.clone();
    let worker_queue = Arc::clone(&queue);
    let handle = tokio::spawn(async move {
        worker_queue.run_worker(&backend, &registry, &delivery, &router, worker_cancel).await;
    });

    let deadline = tokio::time::Instant::now() + std::time::Duration::from_secs(5);
    loop {
        let status = queue.status();
        if !status.history.is_empty() {
            assert_eq!(status.history[0].status, QueueItemStatus::Completed);
            break;
        }
        if tokio::time::Instant::now() > deadline {
            panic!("queued message was never processed");
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }

    cancel.cancel();
    handle.await.unwrap();
}
