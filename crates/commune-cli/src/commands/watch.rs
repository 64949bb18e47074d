use std::collections::HashSet;
use std::time::Duration;

use commune_core::util::unix_millis_now;

use crate::commands::common::{format_message_line, format_preview_line, Session};
use crate::error::CliError;

const MIN_SYNC_INTERVAL_SECS: u64 = 1;

/// Print a conversation's messages as they arrive until Ctrl-C.
pub async fn run_watch_conversation(
    session: &Session,
    conversation_id: &str,
    sync_interval_secs: u64,
) -> Result<(), CliError> {
    let conversation = session.conversation(conversation_id).await?;
    let mut feed = session.service.open_conversation(&conversation.id).await?;
    let mut ticker = sync_ticker(sync_interval_secs);
    let interrupted = tokio::signal::ctrl_c();
    tokio::pin!(interrupted);
    let mut printed = HashSet::new();
    println!("Watching {} (Ctrl-C to stop)", conversation.id);

    loop {
        tokio::select! {
            changed = feed.changed() => {
                let Some(messages) = changed else { break };
                let now = unix_millis_now();
                for message in messages {
                    if printed.insert(message.id.clone()) {
                        println!("{}", format_message_line(&message, session.user_id(), now));
                    }
                }
            }
            _ = ticker.tick() => sync_replica(session).await,
            _ = &mut interrupted => break,
        }
    }

    feed.unsubscribe().await;
    Ok(())
}

/// Reprint the conversation list on every change until Ctrl-C.
pub async fn run_watch_conversations(
    session: &Session,
    sync_interval_secs: u64,
) -> Result<(), CliError> {
    let mut feed = session.service.open_conversation_list().await?;
    let mut ticker = sync_ticker(sync_interval_secs);
    let interrupted = tokio::signal::ctrl_c();
    tokio::pin!(interrupted);
    println!("Watching conversations of {} (Ctrl-C to stop)", session.user_id());

    loop {
        tokio::select! {
            changed = feed.changed() => {
                let Some(previews) = changed else { break };
                let now = unix_millis_now();
                println!("--");
                for preview in &previews {
                    println!("{}", format_preview_line(preview, now));
                }
            }
            _ = ticker.tick() => sync_replica(session).await,
            _ = &mut interrupted => break,
        }
    }

    feed.unsubscribe().await;
    Ok(())
}

fn sync_ticker(interval_secs: u64) -> tokio::time::Interval {
    let period = Duration::from_secs(interval_secs.max(MIN_SYNC_INTERVAL_SECS));
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    ticker
}

async fn sync_replica(session: &Session) {
    if !session.backend.is_sync_enabled() {
        return;
    }
    if let Err(e) = session.backend.sync().await {
        tracing::warn!("Replica sync failed: {e}");
    }
}
