//! Shared client state types.

/// Connection and outbox state shown by clients.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum SyncState {
    /// Offline mode is on; sends are queued.
    Offline,
    /// The outbox is being drained.
    Syncing,
    /// Online with nothing pending.
    #[default]
    Synced,
    /// The last drain left messages pending.
    Error,
}

impl SyncState {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Offline => "offline",
            Self::Syncing => "syncing",
            Self::Synced => "synced",
            Self::Error => "error",
        }
    }
}

impl std::fmt::Display for SyncState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}
