use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;

use super::BlobStore;

/// Blob store backed by a directory: objects live at `{root}/{bucket}/{key}`.
#[derive(Debug, Clone)]
pub struct LocalBlobStore {
    root: PathBuf,
}

impl LocalBlobStore {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    fn object_path(&self, bucket: &str, key: &str) -> PathBuf {
        self.root.join(bucket).join(key)
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn put(&self, bucket: &str, key: &str, data: Vec<u8>) -> Result<()> {
        let path = self.object_path(bucket, key);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let tmp = path.with_extension("tmp");
        tokio::fs::write(&tmp, data).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    async fn get(&self, bucket: &str, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.object_path(bucket, key);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("Failed to read {}", path.display())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_get() {
        let dir = std::env::temp_dir().join(format!("local-blob-{}", uuid::Uuid::new_v4()));
        let store = LocalBlobStore::new(&dir);

        assert_eq!(store.get("b", "a/x.jsonl").await.unwrap(), None);
        store.put("b", "a/x.jsonl", b"one".to_vec()).await.unwrap();
        store.put("b", "a/x.jsonl", b"two".to_vec()).await.unwrap();
        assert_eq!(store.get("b", "a/x.jsonl").await.unwrap(), Some(b"two".to_vec()));
        assert!(dir.join("b/a/x.jsonl").exists());
        std::fs::remove_dir_all(dir).ok();
    }
}
