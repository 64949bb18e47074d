//! In-process change notifications for stores without native push.

use tokio::sync::broadcast;

const CHANGE_CHANNEL_CAPACITY: usize = 256;

/// A write that may affect live queries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Change {
    /// A message was written to a conversation.
    Messages { conversation_id: String },
    /// A conversation document was written.
    Conversations { participants: Vec<String> },
    /// Rows were replaced wholesale by a replica sync.
    Resynced,
}

impl Change {
    /// Whether this change can alter the message query of `conversation_id`.
    #[must_use]
    pub fn touches_conversation(&self, conversation_id: &str) -> bool {
        match self {
            Self::Messages { conversation_id: id } => id == conversation_id,
            Self::Conversations { .. } => false,
            Self::Resynced => true,
        }
    }

    /// Whether this change can alter the conversation query of `user_id`.
    #[must_use]
    pub fn touches_participant(&self, user_id: &str) -> bool {
        match self {
            Self::Messages { .. } => false,
            Self::Conversations { participants } => participants.iter().any(|p| p == user_id),
            Self::Resynced => true,
        }
    }
}

/// Fan-out of [`Change`] events to live queries.
#[derive(Debug, Clone)]
pub struct ChangeHub {
    sender: broadcast::Sender<Change>,
}

impl ChangeHub {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self { sender }
    }

    pub fn publish(&self, change: Change) {
        // No receivers just means no live queries are open.
        let _ = self.sender.send(change);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Change> {
        self.sender.subscribe()
    }
}

impl Default for ChangeHub {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn change_matching() {
        let messages = Change::Messages {
            conversation_id: "c1".to_string(),
        };
        assert!(messages.touches_conversation("c1"));
        assert!(!messages.touches_conversation("c2"));
        assert!(!messages.touches_participant("alice"));

        let conversations = Change::Conversations {
            participants: vec!["alice".to_string(), "bob".to_string()],
        };
        assert!(conversations.touches_participant("bob"));
        assert!(!conversations.touches_participant("carol"));

        assert!(Change::Resynced.touches_conversation("c1"));
        assert!(Change::Resynced.touches_participant("carol"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn publish_reaches_subscribers() {
        let hub = ChangeHub::new();
        hub.publish(Change::Messages {
            conversation_id: "ignored".to_string(),
        });

        let mut receiver = hub.subscribe();
        hub.publish(Change::Messages {
            conversation_id: "c1".to_string(),
        });
        let change = receiver.recv().await.unwrap();
        assert!(change.touches_conversation("c1"));
    }
}
