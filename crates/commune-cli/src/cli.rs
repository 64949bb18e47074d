use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "commune")]
#[command(about = "Chat from the command line, online or offline")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Optional path to local database file
    #[arg(long, global = true, value_name = "PATH")]
    pub db_path: Option<PathBuf>,

    /// Act as this user instead of the profile's user
    #[arg(long, global = true, value_name = "USER_ID")]
    pub user: Option<String>,

    /// CLI profile name
    #[arg(long, global = true, value_name = "NAME")]
    pub profile: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Send a message to a conversation
    Send {
        /// Conversation id
        conversation: String,
        /// Receiver id (defaults to the other participant)
        #[arg(long, value_name = "USER_ID")]
        to: Option<String>,
        /// Message text (read from stdin when omitted)
        content: Vec<String>,
    },
    /// Show a conversation's messages, including queued ones
    Messages {
        /// Conversation id
        conversation: String,
        /// Number of most recent messages to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List your conversations, most recent first
    #[command(alias = "ls")]
    Conversations {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Follow a conversation (or your conversation list) until interrupted
    Watch {
        /// Conversation id; the conversation list when omitted
        conversation: Option<String>,
        /// Seconds between replica syncs
        #[arg(long, default_value = "5", value_name = "SECS")]
        interval: u64,
    },
    /// Open (or create) a direct conversation with a user
    Dm {
        /// The other user's id
        user: String,
    },
    /// Create a group conversation
    Group {
        /// Group name
        #[arg(long)]
        name: String,
        /// Member user ids
        #[arg(required = true)]
        members: Vec<String>,
    },
    /// Mark a conversation as read
    Read {
        /// Conversation id
        conversation: String,
    },
    /// Toggle or inspect offline mode
    Offline {
        #[command(subcommand)]
        command: OfflineCommands,
    },
    /// Inspect or flush queued messages
    Outbox {
        #[command(subcommand)]
        command: OutboxCommands,
    },
    /// Configure CLI profiles
    Profile {
        #[command(subcommand)]
        command: ProfileCommands,
    },
    /// Generate shell completion scripts
    Completions {
        /// Target shell
        #[arg(value_enum)]
        shell: CompletionShell,
        /// Optional output path (stdout when omitted)
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum CompletionShell {
    Bash,
    Zsh,
    Fish,
}

#[derive(Subcommand)]
pub enum OfflineCommands {
    /// Queue outgoing messages locally
    On,
    /// Go back online and deliver queued messages
    Off,
    /// Show offline mode and queue size
    Status,
}

#[derive(Subcommand)]
pub enum OutboxCommands {
    /// List queued messages
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Deliver queued messages now
    Drain,
}

#[derive(Subcommand)]
pub enum ProfileCommands {
    /// Create or update a profile
    Set {
        /// Profile name to update
        #[arg(long, value_name = "NAME")]
        name: Option<String>,
        /// User id to act as
        #[arg(long, value_name = "USER_ID")]
        user_id: Option<String>,
        /// Display name published for this user
        #[arg(long, value_name = "NAME")]
        display_name: Option<String>,
        /// Turso database URL
        #[arg(long, value_name = "URL")]
        turso_url: Option<String>,
        /// Turso auth token
        #[arg(long, value_name = "TOKEN")]
        turso_token: Option<String>,
        /// Keep current active profile instead of activating this one
        #[arg(long)]
        no_activate: bool,
    },
}
