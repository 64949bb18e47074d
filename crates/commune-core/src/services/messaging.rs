//! Messaging facade for one signed-in user.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::watch;

use crate::config::ClientConfig;
use crate::messaging::{
    ConversationListAggregator, ConversationListFeed, ConversationSynchronizer, DeliveryMode,
    MessageDispatcher, MessageFeed, MessageState, SendReceipt,
};
use crate::models::{Conversation, LastMessage, Message, OutgoingMessage};
use crate::outbox::{DrainReport, Outbox};
use crate::remote::RemoteStore;
use crate::state::SyncState;
use crate::storage::KeyValueStore;
use crate::{Error, Result};

/// Key of the persisted offline-mode flag.
pub const OFFLINE_MODE_KEY: &str = "settings.offline_mode";

/// Wires the outbox, dispatcher, synchronizer and aggregator together.
pub struct MessagingService {
    user_id: String,
    remote: Arc<dyn RemoteStore>,
    settings: Arc<dyn KeyValueStore>,
    outbox: Arc<Outbox>,
    state: Arc<MessageState>,
    dispatcher: MessageDispatcher,
    synchronizer: ConversationSynchronizer,
    aggregator: ConversationListAggregator,
    offline: AtomicBool,
    sync_state: watch::Sender<SyncState>,
}

impl MessagingService {
    /// Start a service for `user_id` with default configuration.
    pub async fn new(
        user_id: impl Into<String>,
        remote: Arc<dyn RemoteStore>,
        settings: Arc<dyn KeyValueStore>,
    ) -> Result<Self> {
        Self::open(&ClientConfig::new(user_id), remote, settings).await
    }

    /// Start a service from `config`.
    ///
    /// Loads the outbox and the persisted offline-mode flag; a missing flag
    /// falls back to `config.offline_mode_default`. Queued messages are
    /// visible in conversation feeds right away.
    pub async fn open(
        config: &ClientConfig,
        remote: Arc<dyn RemoteStore>,
        settings: Arc<dyn KeyValueStore>,
    ) -> Result<Self> {
        if config.user_id.trim().is_empty() {
            return Err(Error::InvalidInput("user_id is required".to_string()));
        }

        let offline = match settings.get(OFFLINE_MODE_KEY).await {
            Ok(Some(value)) => parse_flag(&value).unwrap_or(config.offline_mode_default),
            Ok(None) => config.offline_mode_default,
            Err(e) => {
                tracing::warn!("Failed to read offline mode flag: {e}");
                config.offline_mode_default
            }
        };

        let outbox = Arc::new(Outbox::load(Arc::clone(&settings)).await);
        let state = Arc::new(MessageState::new());
        for message in outbox.snapshot().await.into_values().flatten() {
            state.upsert(message).await;
        }
        let initial = if offline {
            SyncState::Offline
        } else if outbox.pending_count().await > 0 {
            SyncState::Error
        } else {
            SyncState::Synced
        };
        let (sync_state, _) = watch::channel(initial);

        Ok(Self {
            user_id: config.user_id.trim().to_string(),
            dispatcher: MessageDispatcher::new(
                Arc::clone(&remote),
                Arc::clone(&outbox),
                Arc::clone(&state),
            ),
            synchronizer: ConversationSynchronizer::new(Arc::clone(&remote), Arc::clone(&state)),
            aggregator: ConversationListAggregator::new(Arc::clone(&remote)),
            remote,
            settings,
            outbox,
            state,
            offline: AtomicBool::new(offline),
            sync_state,
        })
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn is_offline_mode(&self) -> bool {
        self.offline.load(Ordering::SeqCst)
    }

    /// Send a message from the current user.
    ///
    /// Queued when offline mode is on, written to the remote store otherwise.
    pub async fn send_message(&self, mut outgoing: OutgoingMessage) -> Result<SendReceipt> {
        if outgoing.sender_id.trim().is_empty() {
            outgoing.sender_id.clone_from(&self.user_id);
        }
        let mode = if self.is_offline_mode() {
            DeliveryMode::Offline
        } else {
            DeliveryMode::Online
        };
        self.dispatcher.send(outgoing, mode).await
    }

    /// Send a text message to `receiver_id` in `conversation_id`.
    pub async fn send_text(
        &self,
        conversation_id: &str,
        receiver_id: &str,
        content: &str,
    ) -> Result<SendReceipt> {
        self.send_message(OutgoingMessage::text(
            conversation_id,
            self.user_id.as_str(),
            receiver_id,
            content,
        ))
        .await
    }

    /// Submit every queued message.
    ///
    /// Delivered messages replace their queued copies in local state and
    /// update their conversation previews; failures stay queued.
    pub async fn drain_outbox(&self) -> DrainReport {
        self.sync_state.send_replace(SyncState::Syncing);
        let report = self.outbox.drain(self.remote.as_ref()).await;

        for delivered in &report.delivered {
            self.state
                .replace_id(&delivered.local_id, delivered.message.clone())
                .await;
            self.update_preview(&delivered.message).await;
        }

        self.publish_idle_state(&report);
        report
    }

    /// Switch offline mode and persist the choice.
    ///
    /// Going back online drains the outbox and returns the report.
    pub async fn set_offline_mode(&self, offline: bool) -> Option<DrainReport> {
        let was_offline = self.offline.swap(offline, Ordering::SeqCst);
        if let Err(e) = self
            .settings
            .set(OFFLINE_MODE_KEY, if offline { "true" } else { "false" })
            .await
        {
            tracing::warn!("Failed to persist offline mode: {e}");
        }
        tracing::info!("Offline mode {}", if offline { "enabled" } else { "disabled" });

        if offline {
            self.sync_state.send_replace(SyncState::Offline);
            None
        } else if was_offline {
            Some(self.drain_outbox().await)
        } else {
            None
        }
    }

    pub async fn pending_count(&self) -> usize {
        self.outbox.pending_count().await
    }

    /// Queued messages of one conversation.
    pub async fn pending_messages(&self, conversation_id: &str) -> Vec<Message> {
        self.outbox.pending(conversation_id).await
    }

    /// Every queued message, keyed by conversation id.
    pub async fn outbox_snapshot(&self) -> BTreeMap<String, Vec<Message>> {
        self.outbox.snapshot().await
    }

    /// Start a live feed of a conversation's messages.
    pub async fn open_conversation(&self, conversation_id: &str) -> Result<MessageFeed> {
        self.synchronizer.open(conversation_id).await
    }

    /// Start a live feed of the current user's conversation list.
    pub async fn open_conversation_list(&self) -> Result<ConversationListFeed> {
        self.aggregator.open(&self.user_id).await
    }

    /// Messages of a conversation as currently held locally.
    pub async fn messages(&self, conversation_id: &str) -> Vec<Message> {
        self.state.messages(conversation_id).await
    }

    /// The direct conversation with `other_user_id`, created if missing.
    pub async fn start_direct_conversation(&self, other_user_id: &str) -> Result<Conversation> {
        let other_user_id = other_user_id.trim();
        if let Some(existing) = self
            .remote
            .find_direct_conversation(&self.user_id, other_user_id)
            .await?
        {
            return Ok(existing);
        }

        let conversation = Conversation::direct(self.user_id.as_str(), other_user_id)?;
        self.remote.put_conversation(&conversation).await?;
        tracing::info!("Started conversation {} with {other_user_id}", conversation.id);
        Ok(conversation)
    }

    /// Create a group conversation owned by the current user.
    pub async fn create_group(&self, name: &str, members: Vec<String>) -> Result<Conversation> {
        let conversation = Conversation::group(self.user_id.as_str(), name, members)?;
        self.remote.put_conversation(&conversation).await?;
        tracing::info!("Created group {} ({})", name.trim(), conversation.id);
        Ok(conversation)
    }

    /// Reset the current user's unread counter. Failures are only logged.
    pub async fn mark_conversation_read(&self, conversation_id: &str) {
        if let Err(e) = self.remote.reset_unread(conversation_id, &self.user_id).await {
            tracing::warn!("Failed to mark {conversation_id} as read: {e}");
        }
    }

    /// Observe connection and outbox state.
    pub fn sync_state(&self) -> watch::Receiver<SyncState> {
        self.sync_state.subscribe()
    }

    async fn update_preview(&self, message: &Message) {
        let last = LastMessage {
            id: message.id.clone(),
            content: crate::messaging::preview_label(message),
            sender_id: message.sender_id.clone(),
            timestamp: message.created_at,
        };
        if let Err(e) = self
            .remote
            .update_last_message(&message.conversation_id, last)
            .await
        {
            tracing::warn!(
                "Failed to update preview of conversation {}: {e}",
                message.conversation_id
            );
        }
    }

    fn publish_idle_state(&self, report: &DrainReport) {
        let next = if self.is_offline_mode() {
            SyncState::Offline
        } else if report.is_complete() {
            SyncState::Synced
        } else {
            SyncState::Error
        };
        self.sync_state.send_replace(next);
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
