//! Commune CLI - chat from the command line

mod cli;
mod commands;
mod config_profiles;
mod error;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands, OfflineCommands, OutboxCommands, ProfileCommands};
use crate::commands::common::{open_session, SessionOptions};
use crate::commands::completions::run_completions;
use crate::commands::conversations::{run_conversations, run_dm, run_group, run_read};
use crate::commands::messages::run_messages;
use crate::commands::offline::{run_offline_off, run_offline_on, run_offline_status};
use crate::commands::outbox::{run_outbox_drain, run_outbox_list};
use crate::commands::profile::{run_profile_set, ProfileUpdate};
use crate::commands::send::run_send;
use crate::commands::watch::{run_watch_conversation, run_watch_conversations};
use crate::error::CliError;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    let filter = EnvFilter::from_default_env();
    let filter = match "commune=info".parse::<tracing_subscriber::filter::Directive>() {
        Ok(directive) => filter.add_directive(directive),
        Err(_) => filter,
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let options = SessionOptions {
        db_path: cli.db_path,
        user: cli.user,
        profile: cli.profile,
    };

    match cli.command {
        Commands::Completions { shell, output } => run_completions(shell, output.as_deref()),
        Commands::Profile {
            command:
                ProfileCommands::Set {
                    name,
                    user_id,
                    display_name,
                    turso_url,
                    turso_token,
                    no_activate,
                },
        } => {
            let update = ProfileUpdate {
                user_id,
                turso_database_url: turso_url,
                turso_auth_token: turso_token,
                activate: !no_activate,
            };
            run_profile_set(&options, name.as_deref(), display_name.as_deref(), update).await
        }
        command => {
            let session = open_session(&options).await?;
            match command {
                Commands::Send {
                    conversation,
                    to,
                    content,
                } => run_send(&session, &conversation, to.as_deref(), &content).await,
                Commands::Messages {
                    conversation,
                    limit,
                    json,
                } => run_messages(&session, &conversation, limit, json).await,
                Commands::Conversations { json } => run_conversations(&session, json).await,
                Commands::Watch {
                    conversation: Some(conversation),
                    interval,
                } => run_watch_conversation(&session, &conversation, interval).await,
                Commands::Watch {
                    conversation: None,
                    interval,
                } => run_watch_conversations(&session, interval).await,
                Commands::Dm { user } => run_dm(&session, &user).await.map(drop),
                Commands::Group { name, members } => {
                    run_group(&session, &name, members).await.map(drop)
                }
                Commands::Read { conversation } => run_read(&session, &conversation).await,
                Commands::Offline { command } => match command {
                    OfflineCommands::On => run_offline_on(&session).await,
                    OfflineCommands::Off => run_offline_off(&session).await,
                    OfflineCommands::Status => run_offline_status(&session).await,
                },
                Commands::Outbox { command } => match command {
                    OutboxCommands::List { json } => run_outbox_list(&session, json).await,
                    OutboxCommands::Drain => run_outbox_drain(&session).await,
                },
                Commands::Completions { .. } | Commands::Profile { .. } => Ok(()),
            }
        }
    }
}
