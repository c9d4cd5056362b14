//! Storage adapter trait definitions

use async_trait::async_trait;
use serde_json::Value;

use crate::shared::StorageError;

pub type StorageResult<T> = Result<T, StorageError>;

/// Raw key-value backend behind the storage manager.
///
/// Adapters hold no cache and emit no events; the manager owns both.
#[async_trait]
pub trait StorageAdapter: Send + Sync {
    fn name(&self) -> &'static str;

    async fn initialize(&self) -> StorageResult<()> {
        Ok(())
    }

    async fn get(&self, key: &str) -> StorageResult<Option<Value>>;
    async fn set(&self, key: &str, value: &Value) -> StorageResult<()>;
    async fn remove(&self, key: &str) -> StorageResult<()>;
    async fn keys(&self) -> StorageResult<Vec<String>>;
    async fn clear(&self) -> StorageResult<()>;

    async fn has(&self, key: &str) -> StorageResult<bool> {
        Ok(self.get(key).await?.is_some())
    }

    /// Write a batch of entries; used by the deferred flush
    async fn set_many(&self, entries: &[(String, Value)]) -> StorageResult<()> {
        for (key, value) in entries {
            self.set(key, value).await?;
        }
        Ok(())
    }

    async fn close(&self) -> StorageResult<()> {
        Ok(())
    }
}
