use commune_core::models::OutgoingMessage;

use crate::commands::common::{resolve_message_content, resolve_receiver, Session};
use crate::error::CliError;

pub async fn run_send(
    session: &Session,
    conversation_id: &str,
    to: Option<&str>,
    content_parts: &[String],
) -> Result<(), CliError> {
    let content = resolve_message_content(content_parts)?;
    let conversation = session.conversation(conversation_id).await?;
    let receiver = resolve_receiver(&conversation, session.user_id(), to)?;

    let receipt = session
        .service
        .send_message(OutgoingMessage::text(
            conversation.id.as_str(),
            session.user_id(),
            receiver,
            content,
        ))
        .await?;

    if receipt.queued {
        let id = receipt.message.id.clone();
        println!("Queued {id} (offline mode)");
    } else {
        // Let the preview update land before the process exits.
        let message = receipt.settle().await;
        println!("Sent {}", message.id);
    }
    Ok(())
}
