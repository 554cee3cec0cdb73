use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tempfile::NamedTempFile;
use tracing::{debug, instrument};

use crate::error::StorageError;
use crate::store::{ContextStore, StorageResult};

const SNAPSHOT_EXT: &str = "json";

/// Filesystem-backed snapshot store: one file per conversation.
///
/// Layout: `<base>/<conversation_id>.json`
#[derive(Debug, Clone)]
pub struct FileBackend {
    base_dir: PathBuf,
}

impl FileBackend {
    /// Create a new `FileBackend` rooted at `base`. Creates the directory if needed.
    pub fn new(base: impl AsRef<Path>) -> StorageResult<Self> {
        let base_dir = base.as_ref().to_path_buf();
        std::fs::create_dir_all(&base_dir)?;
        Ok(Self { base_dir })
    }

    /// Directory holding the snapshot files.
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn snapshot_path(&self, conversation_id: &str) -> StorageResult<PathBuf> {
        validate_id(conversation_id)?;
        Ok(self
            .base_dir
            .join(format!("{conversation_id}.{SNAPSHOT_EXT}")))
    }
}

/// Reject ids that would escape the base directory or collide with temp files.
fn validate_id(conversation_id: &str) -> StorageResult<()> {
    let bad = conversation_id.is_empty()
        || conversation_id.starts_with('.')
        || conversation_id.contains("..")
        || conversation_id.contains(['/', '\\', '\0']);
    if bad {
        return Err(StorageError::InvalidId(conversation_id.to_string()));
    }
    Ok(())
}

#[async_trait]
impl ContextStore for FileBackend {
    #[instrument(skip(self, data), fields(bytes = data.len()))]
    async fn save(&self, conversation_id: &str, data: &[u8]) -> StorageResult<()> {
        let path = self.snapshot_path(conversation_id)?;
        let dir = self.base_dir.clone();
        let data = data.to_vec();

        // Atomic write: temp file in the same directory, then rename.
        tokio::task::spawn_blocking(move || -> StorageResult<()> {
            let mut tmp = NamedTempFile::new_in(&dir)?;
            tmp.write_all(&data)?;
            tmp.as_file().sync_all()?;
            tmp.persist(&path).map_err(|e| e.error)?;
            Ok(())
        })
        .await
        .map_err(|e| StorageError::Backend(format!("snapshot write task failed: {e}")))??;

        debug!("snapshot saved");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn load(&self, conversation_id: &str) -> StorageResult<Vec<u8>> {
        let path = self.snapshot_path(conversation_id)?;
        tokio::fs::read(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StorageError::NotFound {
                    conversation_id: conversation_id.to_string(),
                }
            } else {
                StorageError::Io(e)
            }
        })
    }

    #[instrument(skip(self))]
    async fn delete(&self, conversation_id: &str) -> StorageResult<()> {
        let path = self.snapshot_path(conversation_id)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    #[instrument(skip(self))]
    async fn list(&self) -> StorageResult<Vec<String>> {
        let mut entries = tokio::fs::read_dir(&self.base_dir).await?;
        let mut ids = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(SNAPSHOT_EXT) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                ids.push(stem.to_string());
            }
        }
        ids.sort();
        Ok(ids)
    }
}
