use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] commune_core::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error(transparent)]
    Profiles(#[from] crate::config_profiles::ProfilesError),
    #[error("No message content provided")]
    EmptyContent,
    #[error("Conversation ID cannot be empty")]
    EmptyConversationId,
    #[error("Conversation not found: {0}")]
    ConversationNotFound(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Offline mode is on. Run `commune offline off` to deliver queued messages.")]
    OfflineMode,
    #[error(
        "No user selected. Pass --user, or run `commune profile set --user-id <ID>` first."
    )]
    MissingUser,
}
