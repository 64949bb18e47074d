//! commune-core - Core library for Commune
//!
//! This crate contains the messaging models, the offline outbox, message
//! dispatch and synchronization, conversation list previews and the libSQL
//! backend used by every Commune client.

pub mod config;
pub mod db;
pub mod error;
pub mod messaging;
pub mod models;
pub mod outbox;
pub mod remote;
pub mod services;
pub mod state;
pub mod storage;
pub mod util;

pub use error::{Error, Result};
pub use models::{Conversation, Message};
pub use services::{Backend, MessagingService};
