//! Message delivery and synchronization.
//!
//! - [`MessageDispatcher`] sends or queues outgoing messages.
//! - [`ConversationSynchronizer`] keeps conversation lists in step with the
//!   remote store.
//! - [`ConversationListAggregator`] derives conversation list previews.
//!
//! All three share one [`MessageState`].

mod aggregator;
mod dispatcher;
mod state;
mod synchronizer;

pub use aggregator::{ConversationListAggregator, ConversationListFeed};
pub use dispatcher::{DeliveryMode, MessageDispatcher, SendReceipt};
pub use state::{order_messages, MessageState};
pub use synchronizer::{ConversationSynchronizer, MessageFeed};

pub(crate) use dispatcher::preview_label;
