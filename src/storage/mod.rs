mod json_file;
mod memory;

pub use json_file::JsonFileStore;
pub use memory::MemoryStore;

use anyhow::Result;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::PersistenceError;

/// Key-value persistence over structured JSON documents.
///
/// Implementations must make each `write` atomic: after a crash a reader sees
/// either the previous document or the new one, never a partial write.
#[async_trait::async_trait]
pub trait DocumentStore: Send + Sync {
    /// Returns `None` when nothing has been written under `key` yet.
    async fn read(&self, key: &str) -> Result<Option<serde_json::Value>>;

    async fn write(&self, key: &str, value: &serde_json::Value) -> Result<()>;
}

/// Read and decode a document, falling back to `T::default()` when absent.
pub async fn read_document<T>(store: &dyn DocumentStore, key: &str) -> Result<T, PersistenceError>
where
    T: DeserializeOwned + Default,
{
    let Some(value) = store
        .read(key)
        .await
        .map_err(|e| PersistenceError::new(key, e))?
    else {
        return Ok(T::default());
    };

    serde_json::from_value(value).map_err(|e| PersistenceError::new(key, e.into()))
}

pub async fn write_document<T>(
    store: &dyn DocumentStore,
    key: &str,
    value: &T,
) -> Result<(), PersistenceError>
where
    T: Serialize + ?Sized,
{
    let value = serde_json::to_value(value).map_err(|e| PersistenceError::new(key, e.into()))?;
    store
        .write(key, &value)
        .await
        .map_err(|e| PersistenceError::new(key, e))
}

/// Returns true if `key` can be used as a single file name.
pub fn is_safe_key(key: &str) -> bool {
    !key.is_empty()
        && !key.starts_with('.')
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
}
