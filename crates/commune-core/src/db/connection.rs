//! Database connection management

use crate::error::Result;
use libsql::{Builder, Connection, Database as LibSqlDatabase};
use std::path::Path;
use std::time::Duration;

use super::migrations;

const DEFAULT_SYNC_INTERVAL: Duration = Duration::from_secs(60);

/// Turso database that backs the shared collections.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    /// e.g. `libsql://chat-org.turso.io`
    pub url: String,
    pub auth_token: String,
    /// `None` means the replica only syncs when asked to
    pub sync_interval: Option<Duration>,
}

impl SyncConfig {
    pub fn new(url: impl Into<String>, auth_token: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            auth_token: auth_token.into(),
            sync_interval: Some(DEFAULT_SYNC_INTERVAL),
        }
    }

    #[must_use]
    pub const fn with_sync_interval(mut self, interval: Duration) -> Self {
        self.sync_interval = Some(interval);
        self
    }

    #[must_use]
    pub const fn without_auto_sync(mut self) -> Self {
        self.sync_interval = None;
        self
    }

    /// Read `TURSO_DATABASE_URL` / `TURSO_AUTH_TOKEN`; `None` unless both are set.
    pub fn from_env() -> Option<Self> {
        let url = std::env::var("TURSO_DATABASE_URL").ok()?;
        let token = std::env::var("TURSO_AUTH_TOKEN").ok()?;
        if url.trim().is_empty() || token.trim().is_empty() {
            return None;
        }
        Some(Self::new(url.trim(), token.trim()))
    }
}

/// libSQL database holding the document collections
pub struct Database {
    db: LibSqlDatabase,
    conn: Connection,
    sync_config: Option<SyncConfig>,
}

impl Database {
    /// Open a local database file, creating it if needed. Runs migrations.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path_str = path.as_ref().to_string_lossy().to_string();
        let db = Builder::new_local(&path_str).build().await?;
        Self::finish_open(db, None).await
    }

    /// Open an in-memory database (useful for testing)
    pub async fn open_in_memory() -> Result<Self> {
        let db = Builder::new_local(":memory:").build().await?;
        Self::finish_open(db, None).await
    }

    /// Open an embedded replica of a remote Turso database.
    ///
    /// Reads are served from the local file; writes go to the remote and
    /// replicate back.
    pub async fn open_with_sync(
        local_path: impl AsRef<Path>,
        sync_config: SyncConfig,
    ) -> Result<Self> {
        let path_str = local_path.as_ref().to_string_lossy().to_string();
        let mut builder = Builder::new_remote_replica(
            &path_str,
            sync_config.url.clone(),
            sync_config.auth_token.clone(),
        );
        if let Some(interval) = sync_config.sync_interval {
            builder = builder.sync_interval(interval);
            tracing::debug!("Automatic replica sync interval set to {:?}", interval);
        }

        let db = builder.build().await?;
        db.sync().await?;
        tracing::debug!("Initial replica sync completed");
        Self::finish_open(db, Some(sync_config)).await
    }

    async fn finish_open(db: LibSqlDatabase, sync_config: Option<SyncConfig>) -> Result<Self> {
        let conn = db.connect()?;
        let database = Self {
            db,
            conn,
            sync_config,
        };
        database.configure().await?;
        migrations::run(&database.conn).await?;
        Ok(database)
    }

    async fn configure(&self) -> Result<()> {
        // Pragmas other than foreign_keys are rejected by remote replicas.
        self.conn
            .execute("PRAGMA journal_mode = WAL;", ())
            .await
            .ok();
        self.conn
            .execute("PRAGMA synchronous = NORMAL;", ())
            .await
            .ok();
        self.conn.execute("PRAGMA foreign_keys = ON;", ()).await?;
        Ok(())
    }

    /// Pull remote changes into the replica (no-op for local databases).
    pub async fn sync(&self) -> Result<()> {
        if self.sync_config.is_some() {
            self.db.sync().await?;
            tracing::debug!("Replica synced with remote");
        }
        Ok(())
    }

    pub const fn is_sync_enabled(&self) -> bool {
        self.sync_config.is_some()
    }

    pub const fn connection(&self) -> &Connection {
        &self.conn
    }
}
