use super::{Storage, StorageEvent, StorageResult};
use crate::error::StorageError;
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::sync::{broadcast, Mutex};
use tracing::debug;

const CHANGE_CAPACITY: usize = 64;

/// One `<key>.json` file per key under a directory
///
/// Writes go to a temp file and are renamed into place, so readers never see
/// a half-written value. Compare-and-swap is atomic only among handles that
/// share this instance (clones included); separate processes writing the same
/// directory can still overwrite each other.
#[derive(Clone)]
pub struct FileStorage {
    dir: PathBuf,
    write_lock: Arc<Mutex<()>>,
    changes: broadcast::Sender<StorageEvent>,
}

impl FileStorage {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CAPACITY);
        Self {
            dir: dir.into(),
            write_lock: Arc::new(Mutex::new(())),
            changes,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> StorageResult<PathBuf> {
        let valid = !key.is_empty()
            && !key.starts_with('.')
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));
        if !valid {
            return Err(StorageError::InvalidKey(key.to_string()));
        }
        Ok(self.dir.join(format!("{}.json", key)))
    }

    async fn read_path(path: &Path) -> StorageResult<Option<String>> {
        match fs::read_to_string(path).await {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_path(&self, path: &Path, value: &str) -> StorageResult<()> {
        fs::create_dir_all(&self.dir).await?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, value).await?;
        fs::rename(&tmp, path).await?;
        debug!(path = %path.display(), bytes = value.len(), "Wrote storage file");
        Ok(())
    }

    fn notify(&self, key: &str) {
        let _ = self.changes.send(StorageEvent {
            key: key.to_string(),
        });
    }
}

#[async_trait]
impl Storage for FileStorage {
    async fn get(&self, key: &str) -> StorageResult<Option<String>> {
        let path = self.path_for(key)?;
        Self::read_path(&path).await
    }

    async fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        let path = self.path_for(key)?;
        {
            let _guard = self.write_lock.lock().await;
            self.write_path(&path, value).await?;
        }
        self.notify(key);
        Ok(())
    }

    async fn remove(&self, key: &str) -> StorageResult<()> {
        let path = self.path_for(key)?;
        let _guard = self.write_lock.lock().await;
        match fs::remove_file(&path).await {
            Ok(()) => {
                self.notify(key);
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<&str>,
        new: &str,
    ) -> StorageResult<bool> {
        let path = self.path_for(key)?;
        {
            let _guard = self.write_lock.lock().await;
            let current = Self::read_path(&path).await?;
            if current.as_deref() != expected {
                return Ok(false);
            }
            self.write_path(&path, new).await?;
        }
        self.notify(key);
        Ok(true)
    }

    fn changes(&self) -> Option<broadcast::Receiver<StorageEvent>> {
        Some(self.changes.subscribe())
    }
}
