//! libSQL backend shared by clients.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::db::{Database, LibSqlKeyValueStore, SyncConfig};
use crate::remote::LibSqlRemoteStore;
use crate::Result;

/// Opened libSQL database exposed as a remote store plus device storage.
#[derive(Clone)]
pub struct Backend {
    remote: Arc<LibSqlRemoteStore>,
    settings: Arc<LibSqlKeyValueStore>,
    db_path: Option<PathBuf>,
}

impl Backend {
    /// Open the backend at the given filesystem path.
    pub async fn open_path(
        db_path: impl Into<PathBuf>,
        sync_config: Option<SyncConfig>,
    ) -> Result<Self> {
        let db_path = db_path.into();
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let db = Self::open_database(db_path.clone(), sync_config).await?;
        Ok(Self::from_database(db, Some(db_path)))
    }

    /// Open an in-memory backend (primarily for tests).
    pub async fn open_in_memory() -> Result<Self> {
        let db = Database::open_in_memory().await?;
        Ok(Self::from_database(db, None))
    }

    fn from_database(db: Database, db_path: Option<PathBuf>) -> Self {
        let settings = Arc::new(LibSqlKeyValueStore::new(db.connection().clone()));
        Self {
            remote: Arc::new(LibSqlRemoteStore::new(Arc::new(db))),
            settings,
            db_path,
        }
    }

    async fn open_database(db_path: PathBuf, sync_config: Option<SyncConfig>) -> Result<Database> {
        if let Some(config) = sync_config {
            Self::open_database_with_sync_recovery(db_path, config)
        } else {
            tracing::info!("Running in local-only mode (no sync config)");
            Database::open(&db_path).await
        }
    }

    fn open_database_with_sync_recovery(
        db_path: PathBuf,
        sync_config: SyncConfig,
    ) -> Result<Database> {
        tracing::info!("Sync enabled with Turso: {}", sync_config.url);
        match Self::open_database_with_sync_thread(db_path.clone(), sync_config.clone()) {
            Ok(db) => Ok(db),
            Err(error) if Self::is_recoverable_local_replica_error(&error) => {
                tracing::warn!(
                    "Detected inconsistent local replica state at {}: {}. Resetting local replica files and retrying once.",
                    db_path.display(),
                    error
                );
                Self::quarantine_corrupted_db_files(&db_path)?;
                Self::open_database_with_sync_thread(db_path, sync_config)
            }
            Err(error) => Err(error),
        }
    }

    // Replica bootstrap needs a deeper stack than tokio workers provide.
    fn open_database_with_sync_thread(
        db_path: PathBuf,
        sync_config: SyncConfig,
    ) -> Result<Database> {
        std::thread::Builder::new()
            .stack_size(8 * 1024 * 1024)
            .spawn(move || {
                tokio::runtime::Builder::new_multi_thread()
                    .enable_all()
                    .build()
                    .map_err(|error| crate::Error::Database(error.to_string()))?
                    .block_on(Database::open_with_sync(&db_path, sync_config))
            })
            .map_err(|error| crate::Error::Database(error.to_string()))?
            .join()
            .map_err(|_| crate::Error::Database("Thread panicked".to_string()))?
    }

    fn is_recoverable_local_replica_error(error: &crate::Error) -> bool {
        let message = error.to_string().to_ascii_lowercase();
        message.contains("file is not a database")
            || message.contains("invalid local state")
            || message.contains("metadata file exists but db file does not")
    }

    fn quarantine_corrupted_db_files(db_path: &Path) -> Result<()> {
        if db_path.exists() {
            let timestamp = chrono::Utc::now().timestamp_millis();
            let base_name = db_path
                .file_name()
                .and_then(|name| name.to_str())
                .unwrap_or("commune.db");
            let backup_path = db_path.with_file_name(format!("{base_name}.corrupt-{timestamp}"));

            std::fs::rename(db_path, &backup_path)?;
            tracing::warn!(
                "Moved corrupted local DB file from {} to {}",
                db_path.display(),
                backup_path.display()
            );
        }

        let Some(parent) = db_path.parent() else {
            return Ok(());
        };
        let Some(base_name) = db_path.file_name().and_then(|name| name.to_str()) else {
            return Ok(());
        };
        let sidecar_prefix = format!("{base_name}-");

        for entry in std::fs::read_dir(parent)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let file_name = entry.file_name();
            let file_name = file_name.to_string_lossy();
            if file_name.starts_with(&sidecar_prefix) {
                let path = entry.path();
                std::fs::remove_file(&path)?;
                tracing::warn!("Removed stale local replica file {}", path.display());
            }
        }

        Ok(())
    }

    /// The document backend.
    pub fn remote_store(&self) -> Arc<LibSqlRemoteStore> {
        Arc::clone(&self.remote)
    }

    /// Device key-value storage in the same database.
    pub fn settings_store(&self) -> Arc<LibSqlKeyValueStore> {
        Arc::clone(&self.settings)
    }

    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    /// Pull remote changes into the replica when sync is enabled.
    pub async fn sync(&self) -> Result<()> {
        self.remote.sync().await
    }

    pub fn is_sync_enabled(&self) -> bool {
        self.remote.database().is_sync_enabled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::RemoteStore;
    use crate::storage::KeyValueStore;
    use crate::models::Conversation;
    use tempfile::tempdir;

    #[tokio::test(flavor = "multi_thread")]
    async fn local_file_backend_persists_documents() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("nested").join("commune.db");

        let conversation = Conversation::direct("alice", "bob").unwrap();
        {
            let backend = Backend::open_path(&path, None).await.unwrap();
            assert!(!backend.is_sync_enabled());
            backend
                .remote_store()
                .put_conversation(&conversation)
                .await
                .unwrap();
            backend
                .settings_store()
                .set("settings.offline_mode", "true")
                .await
                .unwrap();
        }

        let reopened = Backend::open_path(&path, None).await.unwrap();
        assert_eq!(reopened.db_path(), Some(path.as_path()));
        let found = reopened
            .remote_store()
            .get_conversation(&conversation.id)
            .await
            .unwrap();
        assert_eq!(found, Some(conversation));
        assert_eq!(
            reopened
                .settings_store()
                .get("settings.offline_mode")
                .await
                .unwrap()
                .as_deref(),
            Some("true")
        );
    }

    #[test]
    fn detects_recoverable_local_replica_errors() {
        assert!(Backend::is_recoverable_local_replica_error(
            &crate::Error::Database("SQLite failure: file is not a database".to_string())
        ));
        assert!(Backend::is_recoverable_local_replica_error(
            &crate::Error::Database(
                "sync error: invalid local state: metadata file exists but db file does not"
                    .to_string()
            )
        ));
        assert!(!Backend::is_recoverable_local_replica_error(
            &crate::Error::InvalidInput("user_id is required".to_string())
        ));
    }

    #[test]
    fn quarantine_moves_db_and_removes_sidecars() {
        let tmp = tempdir().unwrap();
        let db_path = tmp.path().join("commune.db");
        std::fs::write(&db_path, b"bad-db").unwrap();
        std::fs::write(tmp.path().join("commune.db-info"), b"meta").unwrap();
        std::fs::write(tmp.path().join("commune.db-wal"), b"wal").unwrap();

        Backend::quarantine_corrupted_db_files(&db_path).unwrap();

        let names = std::fs::read_dir(tmp.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().to_string())
            .collect::<Vec<_>>();
        assert_eq!(names.len(), 1);
        assert!(names[0].starts_with("commune.db.corrupt-"));
    }
}
