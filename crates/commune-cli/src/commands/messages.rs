use commune_core::messaging::order_messages;
use commune_core::models::Message;
use commune_core::remote::RemoteStore;
use commune_core::util::unix_millis_now;

use crate::commands::common::{format_message_line, Session};
use crate::error::CliError;

/// Committed messages of a conversation merged with the ones still queued here.
pub async fn conversation_messages(
    session: &Session,
    conversation_id: &str,
) -> Result<Vec<Message>, CliError> {
    let conversation = session.conversation(conversation_id).await?;
    let committed = session
        .remote()
        .list_messages(&conversation.id)
        .await?
        .into_iter()
        .map(Message::from);
    let queued = session.service.pending_messages(&conversation.id).await;
    Ok(order_messages(committed.chain(queued)))
}

pub async fn run_messages(
    session: &Session,
    conversation_id: &str,
    limit: usize,
    as_json: bool,
) -> Result<(), CliError> {
    let messages = conversation_messages(session, conversation_id).await?;
    let skip = messages.len().saturating_sub(limit);
    let recent = &messages[skip..];

    if as_json {
        println!("{}", serde_json::to_string_pretty(recent)?);
        return Ok(());
    }

    if recent.is_empty() {
        println!("No messages yet.");
        return Ok(());
    }

    let now = unix_millis_now();
    for message in recent {
        println!("{}", format_message_line(message, session.user_id(), now));
    }
    Ok(())
}
