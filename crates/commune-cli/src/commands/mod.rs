pub mod common;
pub mod completions;
pub mod conversations;
pub mod messages;
pub mod offline;
pub mod outbox;
pub mod profile;
pub mod send;
pub mod watch;
