//! Conversation list previews.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;

use crate::models::{
    Conversation, ConversationDocument, ConversationPreview, UserProfile, DEFAULT_AVATAR_URL,
    UNKNOWN_USER_NAME, UNNAMED_GROUP_NAME,
};
use crate::remote::RemoteStore;
use crate::util::normalize_text_option;
use crate::Result;

/// Builds display-ready conversation lists for a user.
///
/// Profiles of direct-conversation partners are cached by conversation id and
/// shared by every feed opened from the same aggregator.
#[derive(Clone)]
pub struct ConversationListAggregator {
    remote: Arc<dyn RemoteStore>,
    profiles: Arc<Mutex<HashMap<String, UserProfile>>>,
}

impl ConversationListAggregator {
    pub fn new(remote: Arc<dyn RemoteStore>) -> Self {
        Self {
            remote,
            profiles: Arc::default(),
        }
    }

    /// Subscribe to `user_id`'s conversations.
    pub async fn open(&self, user_id: &str) -> Result<ConversationListFeed> {
        let mut subscription = self.remote.subscribe_conversations(user_id).await?;
        let (sender, receiver) = watch::channel(Vec::new());

        let aggregator = self.clone();
        let user_id = user_id.to_string();
        let task = tokio::spawn(async move {
            while let Some(documents) = subscription.next().await {
                let previews = aggregator.previews(&user_id, documents).await;
                sender.send_replace(previews);
            }
        });

        Ok(ConversationListFeed {
            receiver,
            task: Some(task),
        })
    }

    /// Derive previews from a conversation snapshot, most recent first.
    pub async fn previews(
        &self,
        user_id: &str,
        documents: Vec<ConversationDocument>,
    ) -> Vec<ConversationPreview> {
        let mut previews = Vec::with_capacity(documents.len());
        for document in documents {
            let conversation = Conversation::from(document);
            previews.push(self.preview(user_id, conversation).await);
        }

        previews.sort_by(|a, b| {
            b.last_activity
                .cmp(&a.last_activity)
                .then_with(|| a.id.cmp(&b.id))
        });
        previews
    }

    async fn preview(&self, user_id: &str, conversation: Conversation) -> ConversationPreview {
        let (name, avatar_url) = if conversation.is_group {
            (
                normalize_text_option(conversation.group_name.clone())
                    .unwrap_or_else(|| UNNAMED_GROUP_NAME.to_string()),
                conversation.group_avatar.clone(),
            )
        } else {
            match self.partner_profile(user_id, &conversation).await {
                Some(profile) => (
                    profile.name_or_placeholder().to_string(),
                    Some(
                        profile
                            .avatar_url
                            .unwrap_or_else(|| DEFAULT_AVATAR_URL.to_string()),
                    ),
                ),
                None => (
                    UNKNOWN_USER_NAME.to_string(),
                    Some(DEFAULT_AVATAR_URL.to_string()),
                ),
            }
        };

        ConversationPreview {
            unread_count: conversation.unread_for(user_id),
            last_activity: conversation.last_activity(),
            id: conversation.id,
            is_group: conversation.is_group,
            name,
            avatar_url,
            last_message: conversation.last_message,
        }
    }

    /// The other participant's profile; only successful lookups are cached.
    async fn partner_profile(
        &self,
        user_id: &str,
        conversation: &Conversation,
    ) -> Option<UserProfile> {
        if let Some(profile) = self.profiles.lock().await.get(&conversation.id) {
            return Some(profile.clone());
        }

        let other = conversation.other_participant(user_id)?;
        match self.remote.fetch_profile(other).await {
            Ok(Some(profile)) => {
                self.profiles
                    .lock()
                    .await
                    .insert(conversation.id.clone(), profile.clone());
                Some(profile)
            }
            Ok(None) => {
                tracing::debug!("No profile for {other}");
                None
            }
            Err(e) => {
                tracing::warn!("Profile lookup for {other} failed: {e}");
                None
            }
        }
    }
}

/// A live conversation list.
#[derive(Debug)]
pub struct ConversationListFeed {
    receiver: watch::Receiver<Vec<ConversationPreview>>,
    task: Option<JoinHandle<()>>,
}

impl ConversationListFeed {
    /// The latest previews.
    pub fn previews(&self) -> Vec<ConversationPreview> {
        self.receiver.borrow().clone()
    }

    /// Wait for the next list. `None` once the subscription has ended.
    pub async fn changed(&mut self) -> Option<Vec<ConversationPreview>> {
        self.receiver.changed().await.ok()?;
        Some(self.receiver.borrow_and_update().clone())
    }

    pub async fn unsubscribe(mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            let _ = task.await;
        }
    }
}

impl Drop for ConversationListFeed {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
