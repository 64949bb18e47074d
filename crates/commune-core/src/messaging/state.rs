//! Per-conversation message lists shared by the dispatcher and synchronizer.

use std::collections::HashMap;

use tokio::sync::{watch, RwLock};

use crate::models::Message;

/// Deduplicate by id and sort for display.
///
/// When an id appears more than once the later entry wins, keeping the
/// position of the first. The result is ordered by `created_at` ascending,
/// ties broken by id.
#[must_use]
pub fn order_messages(messages: impl IntoIterator<Item = Message>) -> Vec<Message> {
    let mut ordered: Vec<Message> = Vec::new();
    let mut positions: HashMap<String, usize> = HashMap::new();

    for message in messages {
        if let Some(&index) = positions.get(&message.id) {
            ordered[index] = message;
        } else {
            positions.insert(message.id.clone(), ordered.len());
            ordered.push(message);
        }
    }

    ordered.sort_by(|a, b| {
        a.created_at
            .cmp(&b.created_at)
            .then_with(|| a.id.cmp(&b.id))
    });
    ordered
}

/// Local view of every open conversation's messages.
///
/// Each conversation publishes its list through a `watch` channel; readers
/// see the latest ordered list.
#[derive(Debug, Default)]
pub struct MessageState {
    conversations: RwLock<HashMap<String, watch::Sender<Vec<Message>>>>,
}

impl MessageState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current messages of a conversation.
    pub async fn messages(&self, conversation_id: &str) -> Vec<Message> {
        self.conversations
            .read()
            .await
            .get(conversation_id)
            .map(|sender| sender.borrow().clone())
            .unwrap_or_default()
    }

    /// Subscribe to a conversation's list.
    pub async fn watch(&self, conversation_id: &str) -> watch::Receiver<Vec<Message>> {
        if let Some(sender) = self.conversations.read().await.get(conversation_id) {
            return sender.subscribe();
        }
        self.conversations
            .write()
            .await
            .entry(conversation_id.to_string())
            .or_insert_with(|| watch::channel(Vec::new()).0)
            .subscribe()
    }

    /// Insert or replace one message.
    pub async fn upsert(&self, message: Message) {
        let conversation_id = message.conversation_id.clone();
        self.update(&conversation_id, |current| {
            order_messages(current.iter().cloned().chain([message]))
        })
        .await;
    }

    /// Merge a full remote snapshot into the local list.
    ///
    /// Snapshot entries replace local entries with the same id; local
    /// entries absent from the snapshot (queued messages, sends the
    /// snapshot has not caught up with) are kept.
    pub async fn apply_snapshot(&self, conversation_id: &str, snapshot: Vec<Message>) {
        self.update(conversation_id, |current| {
            order_messages(current.iter().cloned().chain(snapshot))
        })
        .await;
    }

    /// Swap a queued message for its committed record.
    ///
    /// If the committed record already arrived through a snapshot the local
    /// entry is simply dropped.
    pub async fn replace_id(&self, local_id: &str, committed: Message) {
        let conversation_id = committed.conversation_id.clone();
        self.update(&conversation_id, |current| {
            order_messages(
                current
                    .iter()
                    .filter(|message| message.id != local_id)
                    .cloned()
                    .chain([committed]),
            )
        })
        .await;
    }

    async fn update(&self, conversation_id: &str, apply: impl FnOnce(&[Message]) -> Vec<Message>) {
        let mut conversations = self.conversations.write().await;
        let sender = conversations
            .entry(conversation_id.to_string())
            .or_insert_with(|| watch::channel(Vec::new()).0);

        sender.send_if_modified(|current| {
            let next = apply(current.as_slice());
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{OutgoingMessage, Timestamp};
    use pretty_assertions::assert_eq;

    fn message(id: &str, created_at: i64) -> Message {
        let mut message = OutgoingMessage::text("c1", "alice", "bob", id).into_message(id);
        message.created_at = Timestamp::from_millis(created_at);
        message
    }

    fn ids(messages: &[Message]) -> Vec<&str> {
        messages.iter().map(|m| m.id.as_str()).collect()
    }

    #[test]
    fn order_sorts_by_creation_time_then_id() {
        let ordered = order_messages([message("c", 30), message("b", 10), message("a", 10)]);
        assert_eq!(ids(&ordered), vec!["a", "b", "c"]);
    }

    #[test]
    fn order_keeps_latest_duplicate() {
        let mut edited = message("a", 10);
        edited.content = "edited".to_string();

        let ordered = order_messages([message("a", 10), message("b", 20), edited]);
        assert_eq!(ids(&ordered), vec!["a", "b"]);
        assert_eq!(ordered[0].content, "edited");
    }

    #[test]
    fn order_puts_unresolved_timestamps_first() {
        let ordered = order_messages([message("late", 5_000), message("unknown", 0)]);
        assert_eq!(ids(&ordered), vec!["unknown", "late"]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn snapshot_merge_keeps_local_entries() {
        let state = MessageState::new();
        state.upsert(message("local-1", 50)).await;
        state
            .apply_snapshot("c1", vec![message("A", 10), message("B", 20)])
            .await;

        assert_eq!(ids(&state.messages("c1").await), vec!["A", "B", "local-1"]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn replace_id_swaps_local_for_committed() {
        let state = MessageState::new();
        state.upsert(message("local-1", 10)).await;

        let mut receiver = state.watch("c1").await;
        receiver.borrow_and_update();
        state.replace_id("local-1", message("srv-1", 10)).await;

        assert!(receiver.has_changed().unwrap());
        assert_eq!(ids(&state.messages("c1").await), vec!["srv-1"]);

        // The echo arriving later does not duplicate it.
        state.apply_snapshot("c1", vec![message("srv-1", 10)]).await;
        assert_eq!(ids(&state.messages("c1").await), vec!["srv-1"]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn unchanged_update_does_not_notify() {
        let state = MessageState::new();
        state.apply_snapshot("c1", vec![message("A", 10)]).await;

        let mut receiver = state.watch("c1").await;
        receiver.borrow_and_update();
        state.apply_snapshot("c1", vec![message("A", 10)]).await;

        assert!(!receiver.has_changed().unwrap());
    }
}
