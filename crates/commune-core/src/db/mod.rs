//! libSQL persistence for Commune

mod connection;
mod conversation_repository;
mod kv_repository;
mod message_repository;
mod migrations;

pub use connection::{Database, SyncConfig};
pub use conversation_repository::{ConversationRepository, LibSqlConversationRepository};
pub use kv_repository::LibSqlKeyValueStore;
pub use message_repository::{LibSqlMessageRepository, MessageRepository};
