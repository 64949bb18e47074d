//! libSQL-backed remote store.
//!
//! Documents live in a libSQL database, either a local file or an embedded
//! replica of a Turso database. Live queries re-run their query whenever a
//! write made through this store touches them.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{broadcast, mpsc};

use super::hub::{Change, ChangeHub};
use super::{new_document_id, RemoteStore, Subscription};
use crate::db::{
    ConversationRepository, Database, LibSqlConversationRepository, LibSqlMessageRepository,
    MessageRepository,
};
use crate::models::{
    Conversation, ConversationDocument, Message, MessageDocument, NewMessage, UserProfile,
};
use crate::Result;

/// Remote store over a libSQL [`Database`].
#[derive(Clone)]
pub struct LibSqlRemoteStore {
    db: Arc<Database>,
    hub: ChangeHub,
}

impl LibSqlRemoteStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self {
            db,
            hub: ChangeHub::new(),
        }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Pull remote changes into the replica and refresh open live queries.
    pub async fn sync(&self) -> Result<()> {
        self.db.sync().await?;
        self.hub.publish(Change::Resynced);
        Ok(())
    }
}

async fn message_snapshot(db: &Database, conversation_id: &str) -> Result<Vec<MessageDocument>> {
    LibSqlMessageRepository::new(db.connection())
        .list_for_conversation(conversation_id)
        .await
}

async fn conversation_snapshot(db: &Database, user_id: &str) -> Result<Vec<ConversationDocument>> {
    LibSqlConversationRepository::new(db.connection())
        .list_for_participant(user_id)
        .await
}

/// Wait for the next change matching `relevant`.
///
/// Returns `false` once the hub is gone. A lagged receiver counts as a match,
/// since changes may have been missed.
async fn wait_for_change(
    changes: &mut broadcast::Receiver<Change>,
    relevant: impl Fn(&Change) -> bool,
) -> bool {
    loop {
        match changes.recv().await {
            Ok(change) if relevant(&change) => return true,
            Ok(_) => {}
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::debug!("Live query lagged by {skipped} changes; re-querying");
                return true;
            }
            Err(broadcast::error::RecvError::Closed) => return false,
        }
    }
}

#[async_trait]
impl RemoteStore for LibSqlRemoteStore {
    async fn add_message(&self, message: NewMessage) -> Result<Message> {
        let conversation_id = message.conversation_id.clone();
        let document = LibSqlMessageRepository::new(self.db.connection())
            .insert(&new_document_id(), message)
            .await?;

        self.hub.publish(Change::Messages { conversation_id });
        Ok(Message::from(document))
    }

    async fn list_messages(&self, conversation_id: &str) -> Result<Vec<MessageDocument>> {
        message_snapshot(&self.db, conversation_id).await
    }

    async fn subscribe_messages(
        &self,
        conversation_id: &str,
    ) -> Result<Subscription<Vec<MessageDocument>>> {
        // Subscribe before the first query so no write slips between them.
        let mut changes = self.hub.subscribe();
        let initial = message_snapshot(&self.db, conversation_id).await?;

        let (sender, receiver) = mpsc::unbounded_channel();
        let _ = sender.send(initial);

        let db = Arc::clone(&self.db);
        let conversation_id = conversation_id.to_string();
        let task = tokio::spawn(async move {
            while wait_for_change(&mut changes, |c| c.touches_conversation(&conversation_id)).await
            {
                match message_snapshot(&db, &conversation_id).await {
                    Ok(snapshot) => {
                        if sender.send(snapshot).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        tracing::warn!("Message query for {conversation_id} failed: {e}");
                    }
                }
            }
        });

        Ok(Subscription::with_task(receiver, task))
    }

    async fn get_conversation(&self, conversation_id: &str) -> Result<Option<Conversation>> {
        Ok(LibSqlConversationRepository::new(self.db.connection())
            .get(conversation_id)
            .await?
            .map(Conversation::from))
    }

    async fn put_conversation(&self, conversation: &Conversation) -> Result<()> {
        let previous = LibSqlConversationRepository::new(self.db.connection())
            .upsert(conversation)
            .await?;

        let mut participants = conversation.participants.clone();
        participants.extend(previous);
        self.hub.publish(Change::Conversations { participants });
        Ok(())
    }

    async fn list_conversations_for(&self, user_id: &str) -> Result<Vec<ConversationDocument>> {
        conversation_snapshot(&self.db, user_id).await
    }

    async fn subscribe_conversations(
        &self,
        user_id: &str,
    ) -> Result<Subscription<Vec<ConversationDocument>>> {
        let mut changes = self.hub.subscribe();
        let initial = conversation_snapshot(&self.db, user_id).await?;

        let (sender, receiver) = mpsc::unbounded_channel();
        let _ = sender.send(initial);

        let db = Arc::clone(&self.db);
        let user_id = user_id.to_string();
        let task = tokio::spawn(async move {
            while wait_for_change(&mut changes, |c| c.touches_participant(&user_id)).await {
                match conversation_snapshot(&db, &user_id).await {
                    Ok(snapshot) => {
                        if sender.send(snapshot).is_err() {
                            break;
                        }
                    }
                    Err(e) => tracing::warn!("Conversation query for {user_id} failed: {e}"),
                }
            }
        });

        Ok(Subscription::with_task(receiver, task))
    }

    async fn fetch_profile(&self, user_id: &str) -> Result<Option<UserProfile>> {
        LibSqlConversationRepository::new(self.db.connection())
            .get_profile(user_id)
            .await
    }

    async fn put_profile(&self, profile: &UserProfile) -> Result<()> {
        LibSqlConversationRepository::new(self.db.connection())
            .upsert_profile(profile)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{is_local_id, new_local_id, LastMessage, OutgoingMessage, Timestamp};
    use pretty_assertions::assert_eq;

    async fn setup() -> LibSqlRemoteStore {
        LibSqlRemoteStore::new(Arc::new(Database::open_in_memory().await.unwrap()))
    }

    fn new_message(conversation_id: &str, content: &str) -> NewMessage {
        OutgoingMessage::text(conversation_id, "alice", "bob", content)
            .into_message(new_local_id())
            .to_new_message()
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_add_message_assigns_server_id() {
        let store = setup().await;
        let committed = store.add_message(new_message("c1", "hi")).await.unwrap();

        assert!(!is_local_id(&committed.id));
        assert!(committed.is_delivered);

        let documents = store.list_messages("c1").await.unwrap();
        assert_eq!(documents.len(), 1);
        assert_eq!(documents[0].id, committed.id);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_message_subscription_sees_writes() {
        let store = setup().await;
        let mut subscription = store.subscribe_messages("c1").await.unwrap();
        assert!(subscription.next().await.unwrap().is_empty());

        store.add_message(new_message("c2", "elsewhere")).await.unwrap();
        store.add_message(new_message("c1", "hello")).await.unwrap();

        let snapshot = subscription.next().await.unwrap();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].content, "hello");
        subscription.cancel();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_sync_requeries_open_subscriptions() {
        let store = setup().await;
        store.add_message(new_message("c1", "hello")).await.unwrap();

        let mut subscription = store.subscribe_messages("c1").await.unwrap();
        assert_eq!(subscription.next().await.unwrap().len(), 1);

        // Local databases sync as a no-op but still refresh live queries.
        store.sync().await.unwrap();
        assert_eq!(subscription.next().await.unwrap().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_conversation_subscription_and_last_message() {
        let store = setup().await;
        let conversation = Conversation::direct("alice", "bob").unwrap();
        store.put_conversation(&conversation).await.unwrap();

        let mut bob = store.subscribe_conversations("bob").await.unwrap();
        assert_eq!(bob.next().await.unwrap().len(), 1);

        let last = LastMessage {
            id: "m1".to_string(),
            content: "hi bob".to_string(),
            sender_id: "alice".to_string(),
            timestamp: Timestamp::now(),
        };
        store
            .update_last_message(&conversation.id, last)
            .await
            .unwrap();

        let snapshot = bob.next().await.unwrap();
        let updated = Conversation::from(snapshot[0].clone());
        assert_eq!(updated.unread_for("bob"), 1);
        assert_eq!(updated.unread_for("alice"), 0);
        assert_eq!(
            updated.last_message.map(|m| m.content).as_deref(),
            Some("hi bob")
        );

        store.reset_unread(&conversation.id, "bob").await.unwrap();
        let reset = store
            .get_conversation(&conversation.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(reset.unread_for("bob"), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_update_last_message_missing_conversation() {
        let store = setup().await;
        let last = LastMessage {
            id: "m1".to_string(),
            content: "hi".to_string(),
            sender_id: "alice".to_string(),
            timestamp: Timestamp::now(),
        };
        assert!(store.update_last_message("nope", last).await.is_err());
    }
}
