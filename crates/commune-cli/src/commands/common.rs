use std::env;
use std::io::{self, IsTerminal, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use commune_core::config::ClientConfig;
use commune_core::db::SyncConfig;
use commune_core::models::{Conversation, ConversationPreview, Message};
use commune_core::remote::{LibSqlRemoteStore, RemoteStore};
use commune_core::util::preview_text;
use commune_core::{Backend, MessagingService};

use crate::config_profiles::{normalize_profile_name, CliProfilesConfig};
use crate::error::CliError;

const LINE_PREVIEW_CHARS: usize = 60;

/// Global flags shared by every command that touches the database.
#[derive(Debug, Clone, Default)]
pub struct SessionOptions {
    pub db_path: Option<PathBuf>,
    pub user: Option<String>,
    pub profile: Option<String>,
}

/// An opened backend plus the messaging service of the selected user.
pub struct Session {
    pub backend: Backend,
    pub service: MessagingService,
}

impl Session {
    pub fn remote(&self) -> Arc<LibSqlRemoteStore> {
        self.backend.remote_store()
    }

    pub fn user_id(&self) -> &str {
        self.service.user_id()
    }

    /// Fetch a conversation the current user belongs to.
    pub async fn conversation(&self, conversation_id: &str) -> Result<Conversation, CliError> {
        let conversation_id = normalize_conversation_id(conversation_id)?;
        self.remote()
            .get_conversation(&conversation_id)
            .await?
            .filter(|conversation| conversation.has_participant(self.user_id()))
            .ok_or_else(|| CliError::ConversationNotFound(conversation_id))
    }
}

pub async fn open_session(options: &SessionOptions) -> Result<Session, CliError> {
    let db_path = resolve_db_path(options.db_path.clone())?;
    let config = resolve_client_config(options.user.as_deref(), options.profile.as_deref())?;
    open_session_with_config(&db_path, &config).await
}

pub async fn open_session_with_config(
    db_path: &Path,
    config: &ClientConfig,
) -> Result<Session, CliError> {
    config.validate()?;
    let sync_config = config.sync_config().or_else(SyncConfig::from_env);
    let backend = Backend::open_path(db_path, sync_config).await?;

    let remote: Arc<dyn RemoteStore> = backend.remote_store();
    let service = MessagingService::open(config, remote, backend.settings_store()).await?;
    tracing::debug!("Opened session for {}", service.user_id());
    Ok(Session { backend, service })
}

/// Build the client configuration from the profile file, `--user` and `COMMUNE_USER`.
pub fn resolve_client_config(
    user: Option<&str>,
    profile: Option<&str>,
) -> Result<ClientConfig, CliError> {
    let config = CliProfilesConfig::load()?;
    let profile_name = config.resolve_profile_name(profile);
    let user = normalize_profile_name(user)
        .or_else(|| normalize_profile_name(env::var("COMMUNE_USER").ok().as_deref()));

    config
        .profile(&profile_name)
        .cloned()
        .unwrap_or_default()
        .client_config(user.as_deref())
        .ok_or(CliError::MissingUser)
}

pub fn resolve_db_path(cli_db_path: Option<PathBuf>) -> Result<PathBuf, CliError> {
    if let Some(path) = cli_db_path.or_else(|| env::var_os("COMMUNE_DB_PATH").map(PathBuf::from))
    {
        return Ok(path);
    }
    default_db_path()
}

pub fn default_db_path() -> Result<PathBuf, CliError> {
    dirs::data_dir()
        .map(|dir| dir.join("commune").join("commune.db"))
        .ok_or_else(|| CliError::Config("Failed to resolve CLI data directory".to_string()))
}

pub fn normalize_conversation_id(id: &str) -> Result<String, CliError> {
    let trimmed = id.trim();
    if trimmed.is_empty() {
        Err(CliError::EmptyConversationId)
    } else {
        Ok(trimmed.to_string())
    }
}

/// Receiver for a send: `--to` when given, the other participant of a direct
/// conversation, or the conversation itself for groups.
pub fn resolve_receiver(
    conversation: &Conversation,
    user_id: &str,
    explicit: Option<&str>,
) -> Result<String, CliError> {
    if let Some(receiver) = normalize_profile_name(explicit) {
        return Ok(receiver);
    }
    if conversation.is_group {
        return Ok(conversation.id.clone());
    }
    conversation
        .other_participant(user_id)
        .map(str::to_string)
        .ok_or_else(|| CliError::ConversationNotFound(conversation.id.clone()))
}

pub fn resolve_message_content(content_parts: &[String]) -> Result<String, CliError> {
    if let Some(content) = normalize_content(&content_parts.join(" ")) {
        return Ok(content);
    }

    if let Some(content) = read_piped_stdin()? {
        return Ok(content);
    }

    Err(CliError::EmptyContent)
}

pub fn normalize_content(content: &str) -> Option<String> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

pub fn read_piped_stdin() -> Result<Option<String>, CliError> {
    let stdin = io::stdin();
    if stdin.is_terminal() {
        return Ok(None);
    }

    let mut buffer = String::new();
    stdin.lock().read_to_string(&mut buffer)?;
    Ok(normalize_content(&buffer))
}

pub fn format_relative_time(timestamp_ms: i64, now_ms: i64) -> String {
    let diff = now_ms.saturating_sub(timestamp_ms);
    let minute = 60_000;
    let hour = 60 * minute;
    let day = 24 * hour;
    let week = 7 * day;
    let month = 30 * day;
    let year = 365 * day;

    if diff < minute {
        "just now".to_string()
    } else if diff < hour {
        format!("{}m ago", diff / minute)
    } else if diff < day {
        format!("{}h ago", diff / hour)
    } else if diff < week {
        format!("{}d ago", diff / day)
    } else if diff < month {
        format!("{}w ago", diff / week)
    } else if diff < year {
        format!("{}mo ago", diff / month)
    } else {
        format!("{}y ago", diff / year)
    }
}

pub fn format_message_line(message: &Message, user_id: &str, now_ms: i64) -> String {
    let sender = if message.sender_id == user_id {
        "you"
    } else {
        message.sender_id.as_str()
    };
    let body = if message.content.trim().is_empty() && !message.attachments.is_empty() {
        format!("[{} attachment(s)]", message.attachments.len())
    } else {
        message.content.clone()
    };
    let marker = if message.is_pending() { "  (queued)" } else { "" };

    format!(
        "{:<9} {sender}: {body}{marker}",
        format_relative_time(message.created_at.as_millis(), now_ms)
    )
}

pub fn format_preview_line(preview: &ConversationPreview, now_ms: i64) -> String {
    let last = preview.last_message.as_ref().map_or_else(
        || "(no messages yet)".to_string(),
        |last| preview_text(&last.content, LINE_PREVIEW_CHARS),
    );
    let unread = if preview.unread_count > 0 {
        format!(" [{} unread]", preview.unread_count)
    } else {
        String::new()
    };

    format!(
        "{}  {:<9} {}{unread}  {last}",
        preview.id,
        format_relative_time(preview.last_activity.as_millis(), now_ms),
        preview.name
    )
}
