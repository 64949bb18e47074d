//! Message model

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::attachment::Attachment;
use super::timestamp::{normalize_optional, RemoteTimestamp, Timestamp};

/// Prefix carried by ids of messages that only exist in the local outbox.
pub const LOCAL_ID_PREFIX: &str = "local-";

/// Generate an id for a message that has not reached the remote store yet.
#[must_use]
pub fn new_local_id() -> String {
    format!("{LOCAL_ID_PREFIX}{}", Uuid::now_v7())
}

/// Whether `id` was generated locally and is still awaiting a server id.
#[must_use]
pub fn is_local_id(id: &str) -> bool {
    id.starts_with(LOCAL_ID_PREFIX)
}

/// Message type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    #[default]
    Text,
    Image,
    File,
    System,
}

/// Delivery status of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    #[default]
    Sent,
    Delivered,
    Read,
    Failed,
}

/// A message as held in local state and in the outbox.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// `local-` prefixed while pending, server-assigned once committed
    pub id: String,
    pub conversation_id: String,
    pub sender_id: String,
    pub receiver_id: String,
    pub content: String,
    #[serde(rename = "type", default)]
    pub kind: MessageKind,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    #[serde(default)]
    pub status: DeliveryStatus,
    #[serde(default)]
    pub is_delivered: bool,
    #[serde(default)]
    pub is_read: bool,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Message {
    /// Whether this message is still waiting in the outbox.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        is_local_id(&self.id)
    }

    /// Replace a local id with the committed record's id and mark delivered.
    pub fn mark_committed(&mut self, server_id: impl Into<String>) {
        self.id = server_id.into();
        self.is_delivered = true;
        self.status = DeliveryStatus::Delivered;
        self.updated_at = Timestamp::now();
    }

    /// The document body to submit for this message (id omitted).
    #[must_use]
    pub fn to_new_message(&self) -> NewMessage {
        NewMessage {
            conversation_id: self.conversation_id.clone(),
            sender_id: self.sender_id.clone(),
            receiver_id: self.receiver_id.clone(),
            content: self.content.clone(),
            kind: self.kind,
            attachments: self.attachments.clone(),
            status: DeliveryStatus::Delivered,
            is_delivered: true,
            is_read: false,
            created_at: self.created_at,
        }
    }
}

/// Message body submitted to the remote `messages` collection.
///
/// The remote store assigns the document id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewMessage {
    pub conversation_id: String,
    pub sender_id: String,
    pub receiver_id: String,
    pub content: String,
    #[serde(rename = "type")]
    pub kind: MessageKind,
    pub attachments: Vec<Attachment>,
    pub status: DeliveryStatus,
    pub is_delivered: bool,
    pub is_read: bool,
    pub created_at: Timestamp,
}

impl NewMessage {
    /// Build the stored document for this body under a server-assigned id.
    #[must_use]
    pub fn into_document(self, id: impl Into<String>, now: Timestamp) -> MessageDocument {
        MessageDocument {
            id: id.into(),
            conversation_id: self.conversation_id,
            sender_id: self.sender_id,
            receiver_id: self.receiver_id,
            content: self.content,
            kind: self.kind,
            attachments: self.attachments,
            status: self.status,
            is_delivered: self.is_delivered,
            is_read: self.is_read,
            created_at: Some(self.created_at.into()),
            updated_at: Some(now.into()),
        }
    }
}

/// A message document as it arrives from the remote store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageDocument {
    pub id: String,
    pub conversation_id: String,
    #[serde(default)]
    pub sender_id: String,
    #[serde(default)]
    pub receiver_id: String,
    #[serde(default)]
    pub content: String,
    #[serde(rename = "type", default)]
    pub kind: MessageKind,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    #[serde(default)]
    pub status: DeliveryStatus,
    #[serde(default)]
    pub is_delivered: bool,
    #[serde(default)]
    pub is_read: bool,
    #[serde(default)]
    pub created_at: Option<RemoteTimestamp>,
    #[serde(default)]
    pub updated_at: Option<RemoteTimestamp>,
}

impl From<MessageDocument> for Message {
    fn from(doc: MessageDocument) -> Self {
        let created_at = normalize_optional(doc.created_at.as_ref());
        let updated_at = doc
            .updated_at
            .as_ref()
            .map_or(created_at, RemoteTimestamp::normalize);
        Self {
            id: doc.id,
            conversation_id: doc.conversation_id,
            sender_id: doc.sender_id,
            receiver_id: doc.receiver_id,
            content: doc.content,
            kind: doc.kind,
            attachments: doc.attachments,
            status: doc.status,
            is_delivered: doc.is_delivered,
            is_read: doc.is_read,
            created_at,
            updated_at,
        }
    }
}

/// Caller input for sending a message.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct OutgoingMessage {
    pub conversation_id: String,
    pub sender_id: String,
    pub receiver_id: String,
    pub content: String,
    pub kind: MessageKind,
    pub attachments: Vec<Attachment>,
}

impl OutgoingMessage {
    /// A plain text message.
    pub fn text(
        conversation_id: impl Into<String>,
        sender_id: impl Into<String>,
        receiver_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            sender_id: sender_id.into(),
            receiver_id: receiver_id.into(),
            content: content.into(),
            kind: MessageKind::Text,
            attachments: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.attachments.push(attachment);
        self
    }

    #[must_use]
    pub const fn with_kind(mut self, kind: MessageKind) -> Self {
        self.kind = kind;
        self
    }

    /// Build a message record under `id`, created now and not yet delivered.
    #[must_use]
    pub fn into_message(self, id: impl Into<String>) -> Message {
        let now = Timestamp::now();
        Message {
            id: id.into(),
            conversation_id: self.conversation_id,
            sender_id: self.sender_id,
            receiver_id: self.receiver_id,
            content: self.content,
            kind: self.kind,
            attachments: self.attachments,
            status: DeliveryStatus::Sent,
            is_delivered: false,
            is_read: false,
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_local_ids_are_unique_and_prefixed() {
        let a = new_local_id();
        let b = new_local_id();
        assert_ne!(a, b);
        assert!(is_local_id(&a));
        assert!(!is_local_id("abc123"));
    }

    #[test]
    fn test_outgoing_into_message_is_undelivered() {
        let message =
            OutgoingMessage::text("c1", "alice", "bob", "hi").into_message(new_local_id());
        assert!(message.is_pending());
        assert!(!message.is_delivered);
        assert_eq!(message.status, DeliveryStatus::Sent);
        assert_eq!(message.created_at, message.updated_at);
    }

    #[test]
    fn test_mark_committed_replaces_id() {
        let mut message =
            OutgoingMessage::text("c1", "alice", "bob", "hi").into_message(new_local_id());
        message.mark_committed("srv-1");
        assert_eq!(message.id, "srv-1");
        assert!(!message.is_pending());
        assert!(message.is_delivered);
        assert_eq!(message.status, DeliveryStatus::Delivered);
    }

    #[test]
    fn test_document_with_mixed_timestamps_normalizes() {
        let doc: MessageDocument = serde_json::from_str(
            r#"{
                "id": "m1",
                "conversationId": "c1",
                "senderId": "alice",
                "receiverId": "bob",
                "content": "hello",
                "type": "text",
                "isDelivered": true,
                "createdAt": {"seconds": 5, "nanoseconds": 0},
                "updatedAt": "1970-01-01T00:00:06Z"
            }"#,
        )
        .unwrap();

        let message = Message::from(doc);
        assert_eq!(message.created_at, Timestamp::from_millis(5_000));
        assert_eq!(message.updated_at, Timestamp::from_millis(6_000));
        assert!(message.is_delivered);
        assert_eq!(message.status, DeliveryStatus::Sent);
    }

    #[test]
    fn test_document_missing_timestamps_is_earliest() {
        let doc: MessageDocument =
            serde_json::from_str(r#"{"id": "m1", "conversationId": "c1"}"#).unwrap();
        let message = Message::from(doc);
        assert_eq!(message.created_at, Timestamp::EPOCH);
        assert_eq!(message.updated_at, Timestamp::EPOCH);
    }

    #[test]
    fn test_new_message_submits_as_delivered() {
        let message =
            OutgoingMessage::text("c1", "alice", "bob", "hi").into_message(new_local_id());
        let body = message.to_new_message();
        assert!(body.is_delivered);
        assert_eq!(body.status, DeliveryStatus::Delivered);
        assert_eq!(body.created_at, message.created_at);
    }
}
