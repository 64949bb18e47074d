use commune_core::outbox::DrainReport;

use crate::commands::common::Session;
use crate::error::CliError;

pub async fn run_offline_on(session: &Session) -> Result<(), CliError> {
    session.service.set_offline_mode(true).await;
    println!("Offline mode on. New messages will be queued locally.");
    Ok(())
}

pub async fn run_offline_off(session: &Session) -> Result<(), CliError> {
    match session.service.set_offline_mode(false).await {
        Some(report) => {
            println!("Offline mode off.");
            print_drain_report(&report);
        }
        None => println!("Already online."),
    }
    Ok(())
}

pub async fn run_offline_status(session: &Session) -> Result<(), CliError> {
    let mode = if session.service.is_offline_mode() {
        "on"
    } else {
        "off"
    };
    let state = *session.service.sync_state().borrow();
    println!("Offline mode: {mode}");
    println!("Queued messages: {}", session.service.pending_count().await);
    println!("State: {state}");
    Ok(())
}

pub fn print_drain_report(report: &DrainReport) {
    println!(
        "Delivered {} message(s), {} still queued.",
        report.delivered.len(),
        report.retained
    );
    for failed in &report.failed {
        println!(
            "  {} in {}: {}",
            failed.message.id, failed.message.conversation_id, failed.error
        );
    }
}
