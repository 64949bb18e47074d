use std::sync::Arc;

use commune_core::messaging::ConversationListAggregator;
use commune_core::models::{Conversation, ConversationPreview};
use commune_core::remote::RemoteStore;
use commune_core::util::unix_millis_now;

use crate::commands::common::{format_preview_line, Session};
use crate::error::CliError;

pub async fn list_previews(session: &Session) -> Result<Vec<ConversationPreview>, CliError> {
    let remote = session.remote();
    let documents = remote.list_conversations_for(session.user_id()).await?;
    let remote: Arc<dyn RemoteStore> = remote;
    Ok(ConversationListAggregator::new(remote)
        .previews(session.user_id(), documents)
        .await)
}

pub async fn run_conversations(session: &Session, as_json: bool) -> Result<(), CliError> {
    let previews = list_previews(session).await?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&previews)?);
        return Ok(());
    }

    if previews.is_empty() {
        println!("No conversations yet. Start one with `commune dm <user>`.");
        return Ok(());
    }

    let now = unix_millis_now();
    for preview in &previews {
        println!("{}", format_preview_line(preview, now));
    }
    Ok(())
}

pub async fn run_dm(session: &Session, other_user_id: &str) -> Result<Conversation, CliError> {
    let conversation = session
        .service
        .start_direct_conversation(other_user_id)
        .await?;
    println!("{}", conversation.id);
    Ok(conversation)
}

pub async fn run_group(
    session: &Session,
    name: &str,
    members: Vec<String>,
) -> Result<Conversation, CliError> {
    let conversation = session.service.create_group(name, members).await?;
    println!("{}", conversation.id);
    Ok(conversation)
}

pub async fn run_read(session: &Session, conversation_id: &str) -> Result<(), CliError> {
    let conversation = session.conversation(conversation_id).await?;
    session.service.mark_conversation_read(&conversation.id).await;
    println!("Marked {} as read", conversation.id);
    Ok(())
}
