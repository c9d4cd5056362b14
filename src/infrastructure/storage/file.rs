//! File-backed storage adapter
//!
//! One JSON document per key under a data directory. File names are the
//! hex-encoded key so any key maps to a valid, collision-free name. Writes go
//! to a temp file first and are renamed into place.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::Value;
use tokio::fs;
use tracing::{debug, warn};

use super::traits::{StorageAdapter, StorageResult};

const EXTENSION: &str = "json";

pub struct FileAdapter {
    root: PathBuf,
}

impl FileAdapter {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(format!("{}.{}", hex::encode(key), EXTENSION))
    }

    fn key_for(path: &Path) -> Option<String> {
        if path.extension()?.to_str()? != EXTENSION {
            return None;
        }
        let stem = path.file_stem()?.to_str()?;
        let bytes = hex::decode(stem).ok()?;
        String::from_utf8(bytes).ok()
    }
}

#[async_trait]
impl StorageAdapter for FileAdapter {
    fn name(&self) -> &'static str {
        "file"
    }

    async fn initialize(&self) -> StorageResult<()> {
        fs::create_dir_all(&self.root).await?;
        debug!(root = %self.root.display(), "File storage ready");
        Ok(())
    }

    async fn get(&self, key: &str) -> StorageResult<Option<Value>> {
        match fs::read(self.path_for(key)).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn set(&self, key: &str, value: &Value) -> StorageResult<()> {
        let path = self.path_for(key);
        let mut tmp = path.clone();
        tmp.set_extension("tmp");

        let data = serde_json::to_vec_pretty(value)?;
        fs::write(&tmp, data).await?;
        if let Err(e) = fs::rename(&tmp, &path).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        Ok(())
    }

    async fn remove(&self, key: &str) -> StorageResult<()> {
        match fs::remove_file(self.path_for(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn has(&self, key: &str) -> StorageResult<bool> {
        Ok(fs::try_exists(self.path_for(key)).await?)
    }

    async fn keys(&self) -> StorageResult<Vec<String>> {
        let mut dir = match fs::read_dir(&self.root).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut keys = Vec::new();
        while let Some(entry) = dir.next_entry().await? {
            match Self::key_for(&entry.path()) {
                Some(key) => keys.push(key),
                None => {
                    if entry.path().extension().and_then(|e| e.to_str()) == Some(EXTENSION) {
                        warn!(path = %entry.path().display(), "Skipping file with undecodable name");
                    }
                }
            }
        }
        keys.sort();
        Ok(keys)
    }

    async fn clear(&self) -> StorageResult<()> {
        for key in self.keys().await? {
            self.remove(&key).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::StorageError;
    use serde_json::json;

    async fn adapter() -> (tempfile::TempDir, FileAdapter) {
        let dir = tempfile::tempdir().unwrap();
        let adapter = FileAdapter::new(dir.path().join("data"));
        adapter.initialize().await.unwrap();
        (dir, adapter)
    }

    #[tokio::test]
    async fn round_trips_values_across_instances() {
        let (dir, adapter) = adapter().await;
        adapter
            .set("tender-pricing:T-1", &json!({"version": 1}))
            .await
            .unwrap();

        let reopened = FileAdapter::new(dir.path().join("data"));
        assert_eq!(
            reopened.get("tender-pricing:T-1").await.unwrap(),
            Some(json!({"version": 1}))
        );
        assert!(reopened.has("tender-pricing:T-1").await.unwrap());
    }

    #[tokio::test]
    async fn keys_decode_file_names() {
        let (_dir, adapter) = adapter().await;
        adapter.set("b/key", &json!(1)).await.unwrap();
        adapter.set("a:key", &json!(2)).await.unwrap();

        assert_eq!(adapter.keys().await.unwrap(), vec!["a:key", "b/key"]);
    }

    #[tokio::test]
    async fn missing_key_and_remove_are_quiet() {
        let (_dir, adapter) = adapter().await;
        assert_eq!(adapter.get("nope").await.unwrap(), None);
        adapter.remove("nope").await.unwrap();
    }

    #[tokio::test]
    async fn clear_removes_everything() {
        let (_dir, adapter) = adapter().await;
        adapter.set("a", &json!(1)).await.unwrap();
        adapter.set("b", &json!(2)).await.unwrap();
        adapter.clear().await.unwrap();
        assert!(adapter.keys().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn corrupt_file_is_a_serialization_error() {
        let (_dir, adapter) = adapter().await;
        fs::write(adapter.path_for("bad"), b"{not json").await.unwrap();
        assert!(matches!(
            adapter.get("bad").await,
            Err(StorageError::Serialization(_))
        ));
    }
}
