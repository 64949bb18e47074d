//! Outgoing message dispatch.

use std::sync::Arc;

use tokio::task::JoinHandle;

use super::state::MessageState;
use crate::models::{new_local_id, AttachmentKind, LastMessage, Message, OutgoingMessage};
use crate::outbox::Outbox;
use crate::remote::RemoteStore;
use crate::util::preview_text;
use crate::{Error, Result};

const PREVIEW_MAX_CHARS: usize = 120;

/// Where a send goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeliveryMode {
    /// Submit straight to the remote store.
    #[default]
    Online,
    /// Queue in the outbox until the next drain.
    Offline,
}

/// Result of a successful [`MessageDispatcher::send`].
#[derive(Debug)]
pub struct SendReceipt {
    /// The message as now held in local state
    pub message: Message,
    /// Whether the message went to the outbox instead of the remote store
    pub queued: bool,
    preview_update: Option<JoinHandle<()>>,
}

impl SendReceipt {
    /// Wait for the conversation preview update to finish, if one was started.
    ///
    /// The update is best effort; its failures are only logged.
    pub async fn settle(mut self) -> Message {
        if let Some(task) = self.preview_update.take() {
            let _ = task.await;
        }
        self.message
    }
}

/// Sends messages online or queues them offline.
#[derive(Clone)]
pub struct MessageDispatcher {
    remote: Arc<dyn RemoteStore>,
    outbox: Arc<Outbox>,
    state: Arc<MessageState>,
}

impl MessageDispatcher {
    pub fn new(
        remote: Arc<dyn RemoteStore>,
        outbox: Arc<Outbox>,
        state: Arc<MessageState>,
    ) -> Self {
        Self {
            remote,
            outbox,
            state,
        }
    }

    /// Send `outgoing`.
    ///
    /// Offline, the message gets a `local-` id and lands in the outbox and the
    /// local list right away. Online, it is written to the remote store first;
    /// only a committed record reaches local state. A remote failure is
    /// returned as is and nothing is queued.
    pub async fn send(&self, outgoing: OutgoingMessage, mode: DeliveryMode) -> Result<SendReceipt> {
        validate(&outgoing)?;

        match mode {
            DeliveryMode::Offline => {
                let message = outgoing.into_message(new_local_id());
                self.outbox.enqueue(message.clone()).await;
                self.state.upsert(message.clone()).await;
                Ok(SendReceipt {
                    message,
                    queued: true,
                    preview_update: None,
                })
            }
            DeliveryMode::Online => {
                let draft = outgoing.into_message(new_local_id());
                let committed = self.remote.add_message(draft.to_new_message()).await?;
                tracing::debug!(
                    "Message {} committed to {}",
                    committed.id,
                    committed.conversation_id
                );
                self.state.upsert(committed.clone()).await;

                let preview_update = spawn_preview_update(Arc::clone(&self.remote), &committed);
                Ok(SendReceipt {
                    message: committed,
                    queued: false,
                    preview_update: Some(preview_update),
                })
            }
        }
    }
}

fn validate(outgoing: &OutgoingMessage) -> Result<()> {
    if outgoing.conversation_id.trim().is_empty() {
        return Err(Error::InvalidInput(
            "Conversation id cannot be empty".to_string(),
        ));
    }
    if outgoing.receiver_id.trim().is_empty() {
        return Err(Error::InvalidInput("Receiver id cannot be empty".to_string()));
    }
    Ok(())
}

/// Text shown in the conversation list for `message`.
pub(crate) fn preview_label(message: &Message) -> String {
    if !message.content.trim().is_empty() {
        return preview_text(&message.content, PREVIEW_MAX_CHARS);
    }
    match message.attachments.first().map(|attachment| attachment.kind) {
        Some(AttachmentKind::Image) => "[image]".to_string(),
        Some(AttachmentKind::File) => "[file]".to_string(),
        None => String::new(),
    }
}

/// Update the parent conversation's last-message summary in the background.
fn spawn_preview_update(remote: Arc<dyn RemoteStore>, message: &Message) -> JoinHandle<()> {
    let conversation_id = message.conversation_id.clone();
    let last = LastMessage {
        id: message.id.clone(),
        content: preview_label(message),
        sender_id: message.sender_id.clone(),
        timestamp: message.created_at,
    };

    tokio::spawn(async move {
        if let Err(e) = remote.update_last_message(&conversation_id, last).await {
            tracing::warn!("Failed to update preview of conversation {conversation_id}: {e}");
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{is_local_id, Attachment, Conversation};
    use crate::remote::MemoryRemoteStore;
    use crate::storage::MemoryKeyValueStore;
    use pretty_assertions::assert_eq;

    struct Harness {
        remote: Arc<MemoryRemoteStore>,
        outbox: Arc<Outbox>,
        state: Arc<MessageState>,
        dispatcher: MessageDispatcher,
    }

    async fn harness() -> Harness {
        let remote = Arc::new(MemoryRemoteStore::new());
        let outbox = Arc::new(Outbox::load(Arc::new(MemoryKeyValueStore::new())).await);
        let state = Arc::new(MessageState::new());
        let dispatcher = MessageDispatcher::new(remote.clone(), outbox.clone(), state.clone());
        Harness {
            remote,
            outbox,
            state,
            dispatcher,
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn offline_send_queues_without_remote_write() {
        let h = harness().await;
        let receipt = h
            .dispatcher
            .send(
                OutgoingMessage::text("c1", "alice", "bob", "hi"),
                DeliveryMode::Offline,
            )
            .await
            .unwrap();

        assert!(receipt.queued);
        assert!(is_local_id(&receipt.message.id));
        assert!(!receipt.message.is_delivered);
        assert_eq!(h.remote.message_write_count(), 0);
        assert_eq!(h.outbox.pending_count().await, 1);
        assert_eq!(h.state.messages("c1").await, vec![receipt.message]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn online_send_commits_and_updates_preview() {
        let h = harness().await;
        let conversation = Conversation::direct("alice", "bob").unwrap();
        h.remote.put_conversation(&conversation).await.unwrap();

        let receipt = h
            .dispatcher
            .send(
                OutgoingMessage::text(&conversation.id, "alice", "bob", "hello there"),
                DeliveryMode::Online,
            )
            .await
            .unwrap();
        assert!(!receipt.queued);
        let message = receipt.settle().await;

        assert!(!is_local_id(&message.id));
        assert!(message.is_delivered);
        assert_eq!(h.outbox.pending_count().await, 0);
        assert_eq!(h.state.messages(&conversation.id).await, vec![message.clone()]);

        let updated = h
            .remote
            .get_conversation(&conversation.id)
            .await
            .unwrap()
            .unwrap();
        let last = updated.last_message.clone().unwrap();
        assert_eq!(last.id, message.id);
        assert_eq!(last.content, "hello there");
        assert_eq!(updated.unread_for("bob"), 1);
        assert_eq!(updated.unread_for("alice"), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn online_failure_leaves_no_trace() {
        let h = harness().await;
        h.remote.fail_writes();

        let result = h
            .dispatcher
            .send(
                OutgoingMessage::text("c1", "alice", "bob", "lost"),
                DeliveryMode::Online,
            )
            .await;

        assert!(matches!(result, Err(Error::Remote(_))));
        assert!(h.state.messages("c1").await.is_empty());
        assert_eq!(h.outbox.pending_count().await, 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn preview_failure_is_not_surfaced() {
        let h = harness().await;
        // No conversation document exists, so the preview update fails.
        let receipt = h
            .dispatcher
            .send(
                OutgoingMessage::text("missing", "alice", "bob", "hi"),
                DeliveryMode::Online,
            )
            .await
            .unwrap();

        let message = receipt.settle().await;
        assert_eq!(h.state.messages("missing").await, vec![message]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn rejects_missing_ids() {
        let h = harness().await;
        let no_conversation = OutgoingMessage::text("", "alice", "bob", "hi");
        let no_receiver = OutgoingMessage::text("c1", "alice", " ", "hi");

        for outgoing in [no_conversation, no_receiver] {
            let result = h.dispatcher.send(outgoing, DeliveryMode::Offline).await;
            assert!(matches!(result, Err(Error::InvalidInput(_))));
        }
        assert_eq!(h.outbox.pending_count().await, 0);
    }

    #[test]
    fn attachment_only_messages_get_a_label() {
        let attachment =
            Attachment::new(AttachmentKind::File, "https://cdn.example.com/a.pdf").unwrap();
        let message = OutgoingMessage::text("c1", "alice", "bob", "")
            .with_attachment(attachment)
            .into_message("m1");
        assert_eq!(preview_label(&message), "[file]");
    }
}
