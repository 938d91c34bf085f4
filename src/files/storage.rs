use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tokio::fs;
use uuid::Uuid;

/// Transient on-disk holding area for uploads while a request is in flight.
#[derive(Debug, Clone)]
pub struct TempStorage {
    base_dir: PathBuf,
}

impl TempStorage {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Write upload bytes under a unique name. The returned guard removes the
    /// file when dropped.
    pub async fn store(&self, original_filename: &str, data: &[u8]) -> Result<TempFile> {
        fs::create_dir_all(&self.base_dir)
            .await
            .context("Failed to create temp directory")?;

        let ext = Path::new(original_filename)
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("bin");
        let stored_name = format!("upload-{}.{}", Uuid::new_v4(), ext);
        let path = self.base_dir.join(stored_name);

        fs::write(&path, data)
            .await
            .context("Failed to write temp file")?;

        Ok(TempFile {
            path,
            removed: false,
        })
    }
}

/// A temp file that is deleted on every exit path.
#[derive(Debug)]
pub struct TempFile {
    path: PathBuf,
    removed: bool,
}

impl TempFile {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn read(&self) -> Result<Vec<u8>> {
        fs::read(&self.path).await.context("Failed to read temp file")
    }

    /// Delete now. Dropping the guard afterwards is a no-op.
    pub async fn remove(mut self) -> Result<()> {
        self.removed = true;
        match fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).context("Failed to delete temp file"),
        }
    }
}

impl Drop for TempFile {
    fn drop(&mut self) {
        if self.removed {
            return;
        }
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(path = %self.path.display(), error = %e, "Temp file cleanup failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn store_then_remove_leaves_nothing_behind() {
        let dir = tempfile::tempdir().unwrap();
        let storage = TempStorage::new(dir.path().join("tmp"));

        let file = storage.store("notes.txt", b"hello").await.unwrap();
        assert!(file.path().exists());
        assert_eq!(file.read().await.unwrap(), b"hello");
        assert_eq!(file.path().extension().unwrap(), "txt");

        let path = file.path().to_path_buf();
        file.remove().await.unwrap();
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn dropping_the_guard_deletes_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let storage = TempStorage::new(dir.path());

        let path = {
            let file = storage.store("blob", b"\x00\x01").await.unwrap();
            assert_eq!(file.path().extension().unwrap(), "bin");
            file.path().to_path_buf()
        };
        assert!(!path.exists());
    }
}
