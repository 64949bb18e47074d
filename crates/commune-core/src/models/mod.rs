//! Data models for Commune

mod attachment;
mod conversation;
mod message;
mod profile;
mod timestamp;

pub use attachment::{Attachment, AttachmentKind};
pub use conversation::{
    Conversation, ConversationDocument, ConversationPreview, ConversationSettings, LastMessage,
    LastMessageDocument,
};
pub use message::{
    is_local_id, new_local_id, DeliveryStatus, Message, MessageDocument, MessageKind, NewMessage,
    OutgoingMessage, LOCAL_ID_PREFIX,
};
pub use profile::{UserProfile, DEFAULT_AVATAR_URL, UNKNOWN_USER_NAME, UNNAMED_GROUP_NAME};
pub use timestamp::{normalize_optional, RemoteTimestamp, Timestamp};
