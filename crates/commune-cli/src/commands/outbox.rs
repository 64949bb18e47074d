use commune_core::models::Message;
use commune_core::util::unix_millis_now;

use crate::commands::common::{format_message_line, Session};
use crate::commands::offline::print_drain_report;
use crate::error::CliError;

pub async fn run_outbox_list(session: &Session, as_json: bool) -> Result<(), CliError> {
    let snapshot = session.service.outbox_snapshot().await;

    if as_json {
        let queued = snapshot.values().flatten().collect::<Vec<&Message>>();
        println!("{}", serde_json::to_string_pretty(&queued)?);
        return Ok(());
    }

    if snapshot.is_empty() {
        println!("Outbox is empty.");
        return Ok(());
    }

    let now = unix_millis_now();
    for (conversation_id, messages) in &snapshot {
        println!("{conversation_id} ({} queued)", messages.len());
        for message in messages {
            println!("  {}", format_message_line(message, session.user_id(), now));
        }
    }
    Ok(())
}

pub async fn run_outbox_drain(session: &Session) -> Result<(), CliError> {
    if session.service.is_offline_mode() {
        return Err(CliError::OfflineMode);
    }

    let report = session.service.drain_outbox().await;
    print_drain_report(&report);
    Ok(())
}
