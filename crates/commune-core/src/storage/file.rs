//! JSON-file key-value store

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::KeyValueStore;
use crate::{Error, Result};

/// Stores every key in one pretty-printed JSON object file.
///
/// The whole file is replaced on each write, so a crash mid-write leaves
/// the previous contents intact.
#[derive(Debug)]
pub struct FileKeyValueStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileKeyValueStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> Result<BTreeMap<String, String>> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }
        let raw = std::fs::read_to_string(&self.path)?;
        if raw.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        Ok(serde_json::from_str(&raw)?)
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    /// Writes the map to a sibling temp file, fsyncs it, then renames it
    /// over the real file.
    async fn write_all(&self, values: &BTreeMap<String, String>) -> Result<()> {
        let serialized = serde_json::to_string_pretty(values)?;
        let path = self.path.clone();
        let tmp_path = self.tmp_path();
        tokio::task::spawn_blocking(move || {
            write_atomically(&path, &tmp_path, serialized.as_bytes())
        })
        .await
        .map_err(|e| Error::Storage(format!("write task failed: {e}")))?
    }
}

fn write_atomically(path: &Path, tmp_path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    {
        let mut file = std::fs::File::create(tmp_path)?;
        file.write_all(bytes)?;
        file.sync_all()?;
    }
    std::fs::rename(tmp_path, path).map_err(|e| {
        let _ = std::fs::remove_file(tmp_path);
        Error::Storage(format!("failed to replace {}: {e}", path.display()))
    })
}

#[async_trait]
impl KeyValueStore for FileKeyValueStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.read_all()?.remove(key))
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut values = self.read_all()?;
        values.insert(key.to_string(), value.to_string());
        self.write_all(&values).await
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut values = self.read_all()?;
        if values.remove(key).is_some() {
            self.write_all(&values).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test(flavor = "multi_thread")]
    async fn values_survive_reopen() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("nested").join("kv.json");

        let store = FileKeyValueStore::new(&path);
        store.set("a", "1").await.unwrap();
        store.set("b", "2").await.unwrap();
        store.remove("a").await.unwrap();

        let reopened = FileKeyValueStore::new(&path);
        assert_eq!(reopened.get("a").await.unwrap(), None);
        assert_eq!(reopened.get("b").await.unwrap().as_deref(), Some("2"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn corrupt_file_is_an_error() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("kv.json");
        std::fs::write(&path, "{not json").unwrap();

        let store = FileKeyValueStore::new(&path);
        assert!(store.get("a").await.is_err());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn leftover_temp_file_is_ignored() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("kv.json");

        let store = FileKeyValueStore::new(&path);
        store.set("a", "1").await.unwrap();
        assert!(!store.tmp_path().exists());

        std::fs::write(store.tmp_path(), "{\"a\": \"trunc").unwrap();
        let reopened = FileKeyValueStore::new(&path);
        assert_eq!(reopened.get("a").await.unwrap().as_deref(), Some("1"));

        reopened.set("b", "2").await.unwrap();
        assert!(!reopened.tmp_path().exists());
        assert_eq!(reopened.get("a").await.unwrap().as_deref(), Some("1"));
        assert_eq!(reopened.get("b").await.unwrap().as_deref(), Some("2"));
    }
}
