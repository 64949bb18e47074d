//! Offline outbox.
//!
//! Messages sent while offline wait here, keyed by conversation id, until a
//! drain submits them to the remote store. The whole pending set is stored as
//! one serialized record in a [`KeyValueStore`].

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::models::Message;
use crate::remote::RemoteStore;
use crate::storage::KeyValueStore;
use crate::Result;

/// Key of the persisted pending-message record.
pub const OUTBOX_KEY: &str = "outbox.pending_messages";

type PendingMap = BTreeMap<String, Vec<Message>>;

/// A pending message that reached the remote store during a drain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveredMessage {
    /// The `local-` id the message was queued under
    pub local_id: String,
    /// The committed record, carrying the server-assigned id
    pub message: Message,
}

/// A pending message whose submission failed; it stays queued.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedMessage {
    pub message: Message,
    pub error: String,
}

/// Outcome of [`Outbox::drain`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub delivered: Vec<DeliveredMessage>,
    pub failed: Vec<FailedMessage>,
    /// Messages still pending after the drain (failed ones included)
    pub retained: usize,
}

impl DrainReport {
    /// Whether every pending message was delivered.
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        self.retained == 0
    }
}

/// Persisted queue of outbound messages awaiting submission.
pub struct Outbox {
    store: Arc<dyn KeyValueStore>,
    pending: Mutex<PendingMap>,
}

impl Outbox {
    /// Load the persisted pending set.
    ///
    /// A missing, unreadable or corrupt record yields an empty outbox.
    pub async fn load(store: Arc<dyn KeyValueStore>) -> Self {
        let pending = match read_record(store.as_ref()).await {
            Ok(pending) => pending,
            Err(e) => {
                tracing::warn!("Discarding unreadable outbox record: {e}");
                PendingMap::new()
            }
        };
        let count: usize = pending.values().map(Vec::len).sum();
        if count > 0 {
            tracing::info!("Loaded {count} pending messages from the outbox");
        }

        Self {
            store,
            pending: Mutex::new(pending),
        }
    }

    /// Append `message` to its conversation's pending list and persist.
    ///
    /// A failed write is logged; the message stays queued in memory.
    pub async fn enqueue(&self, message: Message) {
        let mut pending = self.pending.lock().await;
        tracing::debug!(
            "Queued message {} for conversation {}",
            message.id,
            message.conversation_id
        );
        pending
            .entry(message.conversation_id.clone())
            .or_default()
            .push(message);

        if let Err(e) = self.persist(&pending).await {
            tracing::warn!("Failed to persist outbox: {e}");
        }
    }

    /// Submit every pending message to `remote`.
    ///
    /// Conversations are drained in id order and each conversation's messages
    /// in queue order. The first failure in a conversation stops that
    /// conversation: the failed message and everything queued after it stay
    /// pending. Delivered messages are removed. The remaining set is persisted
    /// once at the end.
    pub async fn drain(&self, remote: &dyn RemoteStore) -> DrainReport {
        let mut pending = self.pending.lock().await;
        let mut report = DrainReport::default();

        let conversations = std::mem::take(&mut *pending);
        for (conversation_id, messages) in conversations {
            let mut queue = messages.into_iter();
            let mut retained = Vec::new();

            for message in queue.by_ref() {
                match remote.add_message(message.to_new_message()).await {
                    Ok(committed) => {
                        let local_id = message.id.clone();
                        let mut delivered = message;
                        delivered.mark_committed(committed.id);
                        report.delivered.push(DeliveredMessage {
                            local_id,
                            message: delivered,
                        });
                    }
                    Err(e) => {
                        tracing::warn!(
                            "Delivery of {} to {conversation_id} failed: {e}",
                            message.id
                        );
                        report.failed.push(FailedMessage {
                            message: message.clone(),
                            error: e.to_string(),
                        });
                        retained.push(message);
                        break;
                    }
                }
            }
            retained.extend(queue);

            if !retained.is_empty() {
                report.retained += retained.len();
                pending.insert(conversation_id, retained);
            }
        }

        if let Err(e) = self.persist(&pending).await {
            tracing::warn!("Failed to persist outbox after drain: {e}");
        }
        tracing::info!(
            "Outbox drained: {} delivered, {} failed, {} still pending",
            report.delivered.len(),
            report.failed.len(),
            report.retained
        );
        report
    }

    /// Pending messages of one conversation, in queue order.
    pub async fn pending(&self, conversation_id: &str) -> Vec<Message> {
        self.pending
            .lock()
            .await
            .get(conversation_id)
            .cloned()
            .unwrap_or_default()
    }

    pub async fn pending_count(&self) -> usize {
        self.pending.lock().await.values().map(Vec::len).sum()
    }

    /// Every pending message, keyed by conversation id.
    pub async fn snapshot(&self) -> BTreeMap<String, Vec<Message>> {
        self.pending.lock().await.clone()
    }

    async fn persist(&self, pending: &PendingMap) -> Result<()> {
        if pending.is_empty() {
            return self.store.remove(OUTBOX_KEY).await;
        }
        let record = serde_json::to_string(pending)?;
        self.store.set(OUTBOX_KEY, &record).await
    }
}

async fn read_record(store: &dyn KeyValueStore) -> Result<PendingMap> {
    match store.get(OUTBOX_KEY).await? {
        Some(record) => Ok(serde_json::from_str(&record)?),
        None => Ok(PendingMap::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{is_local_id, new_local_id, DeliveryStatus, OutgoingMessage};
    use crate::remote::MemoryRemoteStore;
    use crate::storage::MemoryKeyValueStore;
    use pretty_assertions::assert_eq;

    fn queued(conversation_id: &str, content: &str) -> Message {
        OutgoingMessage::text(conversation_id, "alice", "bob", content).into_message(new_local_id())
    }

    async fn outbox_with_store() -> (Outbox, Arc<MemoryKeyValueStore>) {
        let store = Arc::new(MemoryKeyValueStore::new());
        let outbox = Outbox::load(store.clone()).await;
        (outbox, store)
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn enqueue_persists_without_remote_write() {
        let (outbox, store) = outbox_with_store().await;
        let remote = MemoryRemoteStore::new();

        outbox.enqueue(queued("c1", "one")).await;
        outbox.enqueue(queued("c1", "two")).await;

        assert_eq!(outbox.pending_count().await, 2);
        assert_eq!(remote.message_write_count(), 0);

        let reloaded = Outbox::load(store).await;
        let contents = reloaded
            .pending("c1")
            .await
            .into_iter()
            .map(|m| m.content)
            .collect::<Vec<_>>();
        assert_eq!(contents, vec!["one", "two"]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn full_drain_empties_outbox() {
        let (outbox, store) = outbox_with_store().await;
        let remote = MemoryRemoteStore::new();

        outbox.enqueue(queued("c1", "one")).await;
        outbox.enqueue(queued("c2", "two")).await;

        let report = outbox.drain(&remote).await;
        assert!(report.is_complete());
        assert_eq!(report.delivered.len(), 2);
        assert!(report.failed.is_empty());
        for delivered in &report.delivered {
            assert!(is_local_id(&delivered.local_id));
            assert!(!is_local_id(&delivered.message.id));
            assert!(delivered.message.is_delivered);
        }

        assert_eq!(outbox.pending_count().await, 0);
        assert_eq!(store.get(OUTBOX_KEY).await.unwrap(), None);
        assert_eq!(remote.message_write_count(), 2);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn delivered_message_takes_the_committed_id() {
        let (outbox, _store) = outbox_with_store().await;
        let remote = MemoryRemoteStore::new();
        let message = queued("c1", "hello");
        outbox.enqueue(message.clone()).await;

        let report = outbox.drain(&remote).await;
        let delivered = &report.delivered[0];
        let stored = &remote.message_documents()[0];

        assert_eq!(delivered.local_id, message.id);
        assert_eq!(delivered.message.id, stored.id);
        assert_eq!(delivered.message.content, "hello");
        assert_eq!(delivered.message.created_at, message.created_at);
        assert_eq!(delivered.message.status, DeliveryStatus::Delivered);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn failed_send_retains_it_and_everything_after() {
        let (outbox, store) = outbox_with_store().await;
        let remote = MemoryRemoteStore::new();

        let queued_ids = {
            let mut ids = Vec::new();
            for content in ["m1", "m2", "m3", "m4", "m5"] {
                let message = queued("c1", content);
                ids.push(message.id.clone());
                outbox.enqueue(message).await;
            }
            ids
        };

        // Third of five fails.
        remote.fail_after_writes(2);
        let report = outbox.drain(&remote).await;

        assert_eq!(report.delivered.len(), 2);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].message.id, queued_ids[2]);
        assert_eq!(report.retained, 3);

        let retained = outbox
            .pending("c1")
            .await
            .into_iter()
            .map(|m| m.id)
            .collect::<Vec<_>>();
        assert_eq!(retained, queued_ids[2..].to_vec());

        // The persisted record matches what is still pending.
        let reloaded = Outbox::load(store).await;
        assert_eq!(reloaded.pending_count().await, 3);

        remote.accept_writes();
        let report = outbox.drain(&remote).await;
        assert!(report.is_complete());
        assert_eq!(report.delivered.len(), 3);
        let contents = remote
            .message_documents()
            .into_iter()
            .map(|doc| doc.content)
            .collect::<Vec<_>>();
        assert_eq!(contents, vec!["m1", "m2", "m3", "m4", "m5"]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn failure_in_one_conversation_does_not_block_others() {
        let (outbox, _store) = outbox_with_store().await;
        let remote = MemoryRemoteStore::new();

        outbox.enqueue(queued("a", "first")).await;
        outbox.enqueue(queued("a", "second")).await;
        outbox.enqueue(queued("b", "third")).await;

        remote.fail_after_writes(1);
        let report = outbox.drain(&remote).await;

        // "a" is drained first: its second message fails and the budget is
        // spent, so "b" fails as well but is still attempted.
        assert_eq!(report.delivered.len(), 1);
        assert_eq!(report.failed.len(), 2);
        assert_eq!(report.retained, 2);
        assert_eq!(outbox.pending("a").await.len(), 1);
        assert_eq!(outbox.pending("b").await.len(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn corrupt_record_loads_as_empty() {
        let store = Arc::new(MemoryKeyValueStore::new());
        store.set(OUTBOX_KEY, "{not json").await.unwrap();

        let outbox = Outbox::load(store).await;
        assert_eq!(outbox.pending_count().await, 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn persist_failure_keeps_message_in_memory() {
        let (outbox, store) = outbox_with_store().await;
        store.set_fail_writes(true);

        outbox.enqueue(queued("c1", "kept")).await;
        assert_eq!(outbox.pending_count().await, 1);
        assert_eq!(store.get(OUTBOX_KEY).await.unwrap(), None);
    }
}
