use anyhow::{Context, Result};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use tracing::debug;

/// Storage for raw flight logs
///
/// Paths are relative, `/`-separated strings such as `2024/06/01/LSZF/`.
#[async_trait]
pub trait FileStore: Send + Sync {
    /// Save `bytes` as `dir/name`, creating the directory when needed
    async fn save(&self, dir: &str, name: &str, bytes: &[u8]) -> Result<()>;

    /// Read `dir/name`; `Ok(None)` when the file does not exist
    async fn read(&self, dir: &str, name: &str) -> Result<Option<Vec<u8>>>;

    /// File names directly inside `dir`; empty when the directory does not exist
    async fn list(&self, dir: &str) -> Result<Vec<String>>;
}

/// File store rooted at a local directory
#[derive(Debug, Clone)]
pub struct LocalFileStore {
    root: PathBuf,
}

impl LocalFileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolve a relative path below the root, refusing anything that would
    /// escape it
    fn resolve(&self, relative: &str) -> Result<PathBuf> {
        let relative = Path::new(relative.trim_start_matches('/'));
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
        {
            anyhow::bail!("Refusing path outside storage root: {:?}", relative);
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl FileStore for LocalFileStore {
    async fn save(&self, dir: &str, name: &str, bytes: &[u8]) -> Result<()> {
        let dir_path = self.resolve(dir)?;
        tokio::fs::create_dir_all(&dir_path)
            .await
            .with_context(|| format!("Failed to create directory {:?}", dir_path))?;

        let path = self.resolve(&format!("{}/{}", dir.trim_end_matches('/'), name))?;
        tokio::fs::write(&path, bytes)
            .await
            .with_context(|| format!("Failed to write {:?}", path))?;

        debug!("Saved {} bytes to {:?}", bytes.len(), path);
        Ok(())
    }

    async fn read(&self, dir: &str, name: &str) -> Result<Option<Vec<u8>>> {
        let path = self.resolve(&format!("{}/{}", dir.trim_end_matches('/'), name))?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("Failed to read {:?}", path)),
        }
    }

    async fn list(&self, dir: &str) -> Result<Vec<String>> {
        let dir_path = self.resolve(dir)?;
        let mut entries = match tokio::fs::read_dir(&dir_path).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to list {:?}", dir_path));
            }
        };

        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_file() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        names.sort();
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_save_read_list() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalFileStore::new(dir.path());

        store
            .save("2024/06/01/LSZF/", "b.igc", b"second")
            .await
            .unwrap();
        store
            .save("2024/06/01/LSZF/", "a.igc", b"first")
            .await
            .unwrap();

        assert_eq!(
            store.read("2024/06/01/LSZF/", "a.igc").await.unwrap(),
            Some(b"first".to_vec())
        );
        assert_eq!(
            store.list("2024/06/01/LSZF/").await.unwrap(),
            vec!["a.igc".to_string(), "b.igc".to_string()]
        );
    }

    #[tokio::test]
    async fn test_missing_paths() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalFileStore::new(dir.path());

        assert_eq!(store.read("2024/06/01/LSZF/", "x.igc").await.unwrap(), None);
        assert!(store.list("2024/06/01/LSZF/").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rejects_parent_components() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalFileStore::new(dir.path());

        assert!(store.save("../outside/", "x.igc", b"").await.is_err());
        assert!(store.read("2024/", "../../x.igc").await.is_err());
    }
}
