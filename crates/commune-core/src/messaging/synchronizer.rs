//! Live per-conversation message synchronization.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::state::MessageState;
use crate::models::Message;
use crate::remote::RemoteStore;
use crate::Result;

/// Opens live message feeds and folds their snapshots into [`MessageState`].
#[derive(Clone)]
pub struct ConversationSynchronizer {
    remote: Arc<dyn RemoteStore>,
    state: Arc<MessageState>,
}

impl ConversationSynchronizer {
    pub fn new(remote: Arc<dyn RemoteStore>, state: Arc<MessageState>) -> Self {
        Self { remote, state }
    }

    /// Subscribe to a conversation's messages.
    ///
    /// Every snapshot is normalized, merged with the local list (so queued
    /// and just-sent messages are neither lost nor duplicated) and published
    /// through the returned feed. Keeping a single feed per conversation is
    /// up to the caller.
    pub async fn open(&self, conversation_id: &str) -> Result<MessageFeed> {
        let receiver = self.state.watch(conversation_id).await;
        let mut subscription = self.remote.subscribe_messages(conversation_id).await?;

        let state = Arc::clone(&self.state);
        let id = conversation_id.to_string();
        let task = tokio::spawn(async move {
            while let Some(documents) = subscription.next().await {
                tracing::debug!("Snapshot of {} messages for {id}", documents.len());
                let snapshot = documents.into_iter().map(Message::from).collect();
                state.apply_snapshot(&id, snapshot).await;
            }
            tracing::debug!("Message subscription for {id} closed");
        });

        Ok(MessageFeed {
            conversation_id: conversation_id.to_string(),
            receiver,
            task: Some(task),
        })
    }
}

/// A live, ordered view of one conversation.
///
/// Dropping the feed stops the subscription; [`MessageFeed::unsubscribe`]
/// additionally waits until the listener has stopped.
#[derive(Debug)]
pub struct MessageFeed {
    conversation_id: String,
    receiver: watch::Receiver<Vec<Message>>,
    task: Option<JoinHandle<()>>,
}

impl MessageFeed {
    pub fn conversation_id(&self) -> &str {
        &self.conversation_id
    }

    /// The current ordered list.
    pub fn messages(&self) -> Vec<Message> {
        self.receiver.borrow().clone()
    }

    /// Wait for the list to change and return it.
    pub async fn changed(&mut self) -> Option<Vec<Message>> {
        self.receiver.changed().await.ok()?;
        Some(self.receiver.borrow_and_update().clone())
    }

    /// A receiver for the same list, for callers that want their own.
    pub fn subscribe(&self) -> watch::Receiver<Vec<Message>> {
        self.receiver.clone()
    }

    /// Stop the subscription. No snapshot is applied after this returns.
    pub async fn unsubscribe(mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            let _ = task.await;
        }
        tracing::debug!("Unsubscribed from {}", self.conversation_id);
    }
}

impl Drop for MessageFeed {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
