//! In-memory remote store with failure injection.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::{RemoteStore, Subscription};
use crate::models::{
    Conversation, ConversationDocument, Message, MessageDocument, NewMessage, Timestamp,
    UserProfile,
};
use crate::{Error, Result};

type Listener<T> = (String, mpsc::UnboundedSender<Vec<T>>);

#[derive(Default)]
struct Inner {
    messages: Vec<MessageDocument>,
    conversations: BTreeMap<String, ConversationDocument>,
    profiles: HashMap<String, UserProfile>,
    message_listeners: Vec<Listener<MessageDocument>>,
    conversation_listeners: Vec<Listener<ConversationDocument>>,
    failing_profiles: HashSet<String>,
    /// Message writes allowed before every further write fails.
    write_budget: Option<usize>,
}

/// A fake backend that keeps documents in memory.
///
/// Snapshots are pushed synchronously on every write. Message writes can be
/// made to fail to exercise error paths.
#[derive(Default)]
pub struct MemoryRemoteStore {
    inner: Mutex<Inner>,
    next_id: AtomicUsize,
    message_writes: AtomicUsize,
    profile_lookups: AtomicUsize,
}

impl MemoryRemoteStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Allow `count` more successful message writes, then fail the rest.
    pub fn fail_after_writes(&self, count: usize) {
        self.lock().write_budget = Some(count);
    }

    /// Make every message write fail from now on.
    pub fn fail_writes(&self) {
        self.fail_after_writes(0);
    }

    /// Let message writes succeed again.
    pub fn accept_writes(&self) {
        self.lock().write_budget = None;
    }

    /// Make profile lookups for `user_id` fail.
    pub fn fail_profile(&self, user_id: impl Into<String>) {
        self.lock().failing_profiles.insert(user_id.into());
    }

    /// Number of messages successfully written.
    pub fn message_write_count(&self) -> usize {
        self.message_writes.load(Ordering::SeqCst)
    }

    /// Number of profile lookups served (including failed ones).
    pub fn profile_lookup_count(&self) -> usize {
        self.profile_lookups.load(Ordering::SeqCst)
    }

    /// Every stored message document, in write order.
    pub fn message_documents(&self) -> Vec<MessageDocument> {
        self.lock().messages.clone()
    }

    /// Push an arbitrary snapshot to the listeners of `conversation_id`.
    pub fn emit_messages(&self, conversation_id: &str, snapshot: Vec<MessageDocument>) {
        let mut inner = self.lock();
        inner.message_listeners.retain(|(id, sender)| {
            id != conversation_id || sender.send(snapshot.clone()).is_ok()
        });
    }

    fn notify_messages(inner: &mut Inner, conversation_id: &str) {
        let snapshot = messages_of(&inner.messages, conversation_id);
        inner.message_listeners.retain(|(id, sender)| {
            id != conversation_id || sender.send(snapshot.clone()).is_ok()
        });
    }

    fn notify_conversations(inner: &mut Inner, participants: &[String]) {
        let Inner {
            conversations,
            conversation_listeners,
            ..
        } = inner;
        let conversations = &*conversations;
        conversation_listeners.retain(|(user_id, sender)| {
            if !participants.contains(user_id) {
                return !sender.is_closed();
            }
            sender
                .send(conversations_of(conversations, user_id))
                .is_ok()
        });
    }

    fn take_write_slot(inner: &mut Inner) -> Result<()> {
        match inner.write_budget {
            Some(0) => Err(Error::Remote("injected write failure".to_string())),
            Some(ref mut budget) => {
                *budget -= 1;
                Ok(())
            }
            None => Ok(()),
        }
    }
}

fn messages_of(messages: &[MessageDocument], conversation_id: &str) -> Vec<MessageDocument> {
    messages
        .iter()
        .filter(|doc| doc.conversation_id == conversation_id)
        .cloned()
        .collect()
}

fn conversations_of(
    conversations: &BTreeMap<String, ConversationDocument>,
    user_id: &str,
) -> Vec<ConversationDocument> {
    conversations
        .values()
        .filter(|doc| doc.participants.iter().any(|p| p == user_id))
        .cloned()
        .collect()
}

#[async_trait]
impl RemoteStore for MemoryRemoteStore {
    async fn add_message(&self, message: NewMessage) -> Result<Message> {
        let mut inner = self.lock();
        Self::take_write_slot(&mut inner)?;

        let sequence = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let conversation_id = message.conversation_id.clone();
        let document = message.into_document(format!("srv-{sequence}"), Timestamp::now());
        inner.messages.push(document.clone());
        self.message_writes.fetch_add(1, Ordering::SeqCst);

        Self::notify_messages(&mut inner, &conversation_id);
        Ok(Message::from(document))
    }

    async fn list_messages(&self, conversation_id: &str) -> Result<Vec<MessageDocument>> {
        Ok(messages_of(&self.lock().messages, conversation_id))
    }

    async fn subscribe_messages(
        &self,
        conversation_id: &str,
    ) -> Result<Subscription<Vec<MessageDocument>>> {
        let (sender, receiver) = mpsc::unbounded_channel();
        let mut inner = self.lock();
        // Like a native listener, the current result set arrives first.
        let _ = sender.send(messages_of(&inner.messages, conversation_id));
        inner
            .message_listeners
            .push((conversation_id.to_string(), sender));
        Ok(Subscription::from_channel(receiver))
    }

    async fn get_conversation(&self, conversation_id: &str) -> Result<Option<Conversation>> {
        Ok(self
            .lock()
            .conversations
            .get(conversation_id)
            .cloned()
            .map(Conversation::from))
    }

    async fn put_conversation(&self, conversation: &Conversation) -> Result<()> {
        let mut inner = self.lock();
        let previous_participants = inner
            .conversations
            .insert(
                conversation.id.clone(),
                ConversationDocument::from(conversation),
            )
            .map(|previous| previous.participants)
            .unwrap_or_default();

        let mut affected = conversation.participants.clone();
        affected.extend(previous_participants);
        Self::notify_conversations(&mut inner, &affected);
        Ok(())
    }

    async fn list_conversations_for(&self, user_id: &str) -> Result<Vec<ConversationDocument>> {
        Ok(conversations_of(&self.lock().conversations, user_id))
    }

    async fn subscribe_conversations(
        &self,
        user_id: &str,
    ) -> Result<Subscription<Vec<ConversationDocument>>> {
        let (sender, receiver) = mpsc::unbounded_channel();
        let mut inner = self.lock();
        let _ = sender.send(conversations_of(&inner.conversations, user_id));
        inner
            .conversation_listeners
            .push((user_id.to_string(), sender));
        Ok(Subscription::from_channel(receiver))
    }

    async fn fetch_profile(&self, user_id: &str) -> Result<Option<UserProfile>> {
        self.profile_lookups.fetch_add(1, Ordering::SeqCst);
        let inner = self.lock();
        if inner.failing_profiles.contains(user_id) {
            return Err(Error::Remote(format!("profile lookup failed for {user_id}")));
        }
        Ok(inner.profiles.get(user_id).cloned())
    }

    async fn put_profile(&self, profile: &UserProfile) -> Result<()> {
        self.lock()
            .profiles
            .insert(profile.id.clone(), profile.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{new_local_id, OutgoingMessage};

    fn new_message(conversation_id: &str, content: &str) -> NewMessage {
        OutgoingMessage::text(conversation_id, "alice", "bob", content)
            .into_message(new_local_id())
            .to_new_message()
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn add_message_assigns_server_id_and_notifies() {
        let store = MemoryRemoteStore::new();
        let mut subscription = store.subscribe_messages("c1").await.unwrap();
        assert!(subscription.next().await.unwrap().is_empty());

        let committed = store.add_message(new_message("c1", "hi")).await.unwrap();
        assert_eq!(committed.id, "srv-1");
        assert!(committed.is_delivered);

        let snapshot = subscription.next().await.unwrap();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].id, "srv-1");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn write_budget_fails_after_limit() {
        let store = MemoryRemoteStore::new();
        store.fail_after_writes(1);

        assert!(store.add_message(new_message("c1", "one")).await.is_ok());
        assert!(store.add_message(new_message("c1", "two")).await.is_err());
        assert_eq!(store.message_write_count(), 1);

        store.accept_writes();
        assert!(store.add_message(new_message("c1", "three")).await.is_ok());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn conversation_listeners_only_see_their_conversations() {
        let store = MemoryRemoteStore::new();
        let mut carol = store.subscribe_conversations("carol").await.unwrap();
        assert!(carol.next().await.unwrap().is_empty());

        let direct = Conversation::direct("alice", "bob").unwrap();
        store.put_conversation(&direct).await.unwrap();
        let group = Conversation::group("alice", "All", vec!["carol".to_string()]).unwrap();
        store.put_conversation(&group).await.unwrap();

        let snapshot = carol.next().await.unwrap();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].id, group.id);

        let found = store
            .find_direct_conversation("bob", "alice")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, direct.id);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn failing_profiles_error() {
        let store = MemoryRemoteStore::new();
        store
            .put_profile(&UserProfile::new("bob", "Bob"))
            .await
            .unwrap();
        store.fail_profile("eve");

        assert!(store.fetch_profile("bob").await.unwrap().is_some());
        assert!(store.fetch_profile("eve").await.is_err());
        assert_eq!(store.profile_lookup_count(), 2);
    }
}
