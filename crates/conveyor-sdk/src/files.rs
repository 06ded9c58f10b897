use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::Path;

/// File access as seen by actions. Swappable so tests and sandboxed runs can
/// redirect reads and writes.
#[async_trait]
pub trait FileAccessor: Send + Sync {
    async fn read(&self, path: &Path) -> Result<Vec<u8>>;

    async fn write(&self, path: &Path, contents: &[u8]) -> Result<()>;

    async fn exists(&self, path: &Path) -> bool;

    async fn remove(&self, path: &Path) -> Result<()>;

    async fn read_to_string(&self, path: &Path) -> Result<String> {
        let bytes = self.read(path).await?;
        String::from_utf8(bytes)
            .with_context(|| format!("File '{}' is not valid UTF-8", path.display()))
    }
}

/// The real filesystem, via `tokio::fs`.
#[derive(Debug, Clone, Default)]
pub struct LocalFiles;

#[async_trait]
impl FileAccessor for LocalFiles {
    async fn read(&self, path: &Path) -> Result<Vec<u8>> {
        tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read '{}'", path.display()))
    }

    async fn write(&self, path: &Path, contents: &[u8]) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .with_context(|| format!("Failed to create '{}'", parent.display()))?;
            }
        }
        tokio::fs::write(path, contents)
            .await
            .with_context(|| format!("Failed to write '{}'", path.display()))
    }

    async fn exists(&self, path: &Path) -> bool {
        tokio::fs::metadata(path).await.is_ok()
    }

    async fn remove(&self, path: &Path) -> Result<()> {
        tokio::fs::remove_file(path)
            .await
            .with_context(|| format!("Failed to remove '{}'", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn write_read_remove() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("cert.pem");
        let files = LocalFiles;

        files.write(&path, b"-----BEGIN-----").await.unwrap();
        assert!(files.exists(&path).await);
        assert_eq!(files.read_to_string(&path).await.unwrap(), "-----BEGIN-----");

        files.remove(&path).await.unwrap();
        assert!(!files.exists(&path).await);
    }

    #[tokio::test]
    async fn read_missing_file_names_the_path() {
        let err = LocalFiles
            .read(Path::new("/definitely/not/here.txt"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("/definitely/not/here.txt"));
    }

    #[tokio::test]
    async fn read_to_string_rejects_binary() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blob.bin");
        LocalFiles.write(&path, &[0xff, 0xfe, 0x00]).await.unwrap();
        assert!(LocalFiles.read_to_string(&path).await.is_err());
    }
}
