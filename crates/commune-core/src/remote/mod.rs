//! Remote document store seam.
//!
//! The backend exposes two collections (`messages`, `conversations`) plus
//! user profiles. Live queries are modelled as [`Subscription`]s that yield
//! the full current result set on every change.

mod hub;
mod libsql_store;
mod memory;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::models::{
    Conversation, ConversationDocument, LastMessage, Message, MessageDocument, NewMessage,
    UserProfile,
};
use crate::{Error, Result};

pub use hub::{Change, ChangeHub};
pub use libsql_store::LibSqlRemoteStore;
pub use memory::MemoryRemoteStore;

/// Backend operations the messaging subsystem depends on.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Add a message document; the store assigns its id.
    async fn add_message(&self, message: NewMessage) -> Result<Message>;

    /// Current messages of a conversation.
    async fn list_messages(&self, conversation_id: &str) -> Result<Vec<MessageDocument>>;

    /// Live query over a conversation's messages.
    async fn subscribe_messages(
        &self,
        conversation_id: &str,
    ) -> Result<Subscription<Vec<MessageDocument>>>;

    async fn get_conversation(&self, conversation_id: &str) -> Result<Option<Conversation>>;

    /// Create or overwrite a conversation document.
    async fn put_conversation(&self, conversation: &Conversation) -> Result<()>;

    /// Conversations whose participants contain `user_id`.
    async fn list_conversations_for(&self, user_id: &str) -> Result<Vec<ConversationDocument>>;

    /// Live query over the conversations `user_id` participates in.
    async fn subscribe_conversations(
        &self,
        user_id: &str,
    ) -> Result<Subscription<Vec<ConversationDocument>>>;

    async fn fetch_profile(&self, user_id: &str) -> Result<Option<UserProfile>>;

    async fn put_profile(&self, profile: &UserProfile) -> Result<()>;

    /// Set the conversation's last-message summary and bump unread counters.
    async fn update_last_message(&self, conversation_id: &str, last: LastMessage) -> Result<()> {
        let mut conversation = self
            .get_conversation(conversation_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("conversation {conversation_id}")))?;
        conversation.apply_last_message(last);
        self.put_conversation(&conversation).await
    }

    /// Reset `user_id`'s unread counter in a conversation.
    async fn reset_unread(&self, conversation_id: &str, user_id: &str) -> Result<()> {
        let mut conversation = self
            .get_conversation(conversation_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("conversation {conversation_id}")))?;
        if conversation.unread_for(user_id) == 0 {
            return Ok(());
        }
        conversation.unread_counts.insert(user_id.to_string(), 0);
        self.put_conversation(&conversation).await
    }

    /// The existing direct conversation between two users, if any.
    async fn find_direct_conversation(
        &self,
        user_id: &str,
        other_user_id: &str,
    ) -> Result<Option<Conversation>> {
        let found = self
            .list_conversations_for(user_id)
            .await?
            .into_iter()
            .map(Conversation::from)
            .find(|conversation| {
                !conversation.is_group
                    && conversation.participants.len() == 2
                    && conversation.has_participant(other_user_id)
            });
        Ok(found)
    }
}

/// A live query handle.
///
/// Each item is the complete result set at the time of a change. Dropping the
/// handle or calling [`Subscription::cancel`] stops delivery.
#[derive(Debug)]
pub struct Subscription<T> {
    receiver: mpsc::UnboundedReceiver<T>,
    task: Option<JoinHandle<()>>,
}

impl<T> Subscription<T> {
    /// A subscription fed directly through a channel.
    pub const fn from_channel(receiver: mpsc::UnboundedReceiver<T>) -> Self {
        Self {
            receiver,
            task: None,
        }
    }

    /// A subscription fed by a background task that is aborted on cancel.
    pub const fn with_task(receiver: mpsc::UnboundedReceiver<T>, task: JoinHandle<()>) -> Self {
        Self {
            receiver,
            task: Some(task),
        }
    }

    /// Wait for the next result set. `None` once the source has closed.
    pub async fn next(&mut self) -> Option<T> {
        self.receiver.recv().await
    }

    /// Stop the live query.
    pub fn cancel(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.receiver.close();
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Generate a server-side document id.
pub(crate) fn new_document_id() -> String {
    uuid::Uuid::now_v7().simple().to_string()
}
