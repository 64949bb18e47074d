//! Client-facing services.

mod backend;
mod messaging;

pub use backend::Backend;
pub use messaging::{MessagingService, OFFLINE_MODE_KEY};
