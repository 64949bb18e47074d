//! On-device key-value persistence.
//!
//! The outbox and client settings are stored as serialized records under
//! fixed keys. Backends are injectable so the outbox can be exercised without
//! a real device store.

mod file;
mod memory;

use async_trait::async_trait;

use crate::Result;

pub use file::FileKeyValueStore;
pub use memory::MemoryKeyValueStore;

/// Key-value storage backend.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Read the value stored under `key`.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Store `value` under `key`, replacing any previous value.
    async fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Remove `key`. Removing a missing key is not an error.
    async fn remove(&self, key: &str) -> Result<()>;
}
