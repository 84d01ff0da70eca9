use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use tokio::fs;
use tokio::sync::Mutex;

use super::{is_safe_key, DocumentStore};

/// JSON file-based document store.
///
/// Directory structure:
/// ```text
/// data/
///   rates.json            # rate cache
///   exchange_rates.json   # history journal
///   portfolios.json       # wallet ledger
/// ```
///
/// Writes go to `<key>.json.tmp` first and are renamed into place, so a crash
/// mid-write leaves the previous document intact.
pub struct JsonFileStore {
    base_path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonFileStore {
    pub fn new(base_path: impl AsRef<Path>) -> Self {
        Self {
            base_path: base_path.as_ref().to_path_buf(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn document_file(&self, key: &str) -> Result<PathBuf> {
        if !is_safe_key(key) {
            bail!("Invalid document key {key:?}");
        }
        Ok(self.base_path.join(format!("{key}.json")))
    }

    async fn ensure_dir(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .context("Failed to create data directory")?;
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl DocumentStore for JsonFileStore {
    async fn read(&self, key: &str) -> Result<Option<serde_json::Value>> {
        let path = self.document_file(key)?;
        match fs::read_to_string(&path).await {
            Ok(content) => {
                let value = serde_json::from_str(&content)
                    .with_context(|| format!("Failed to parse JSON from {}", path.display()))?;
                Ok(Some(value))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("Failed to read {}", path.display())),
        }
    }

    async fn write(&self, key: &str, value: &serde_json::Value) -> Result<()> {
        let path = self.document_file(key)?;
        let tmp_path = path.with_extension("json.tmp");
        let content = serde_json::to_string_pretty(value).context("Failed to serialize JSON")?;

        let _guard = self.write_lock.lock().await;
        self.ensure_dir(&path).await?;

        if let Err(e) = fs::write(&tmp_path, content).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(e).with_context(|| format!("Failed to write {}", tmp_path.display()));
        }
        fs::rename(&tmp_path, &path)
            .await
            .with_context(|| format!("Failed to move document into {}", path.display()))?;
        Ok(())
    }
}
