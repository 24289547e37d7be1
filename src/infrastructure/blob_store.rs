//! Blob store access for feed files
//!
//! The vendor drops the index, detail documents, reference files and
//! generated schemas into a blob store. Everything that reads feed data
//! goes through the [`BlobStore`] trait so tests and local runs can use
//! a plain directory.

use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;

/// Access to the feed blob store.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Whether the blob exists.
    async fn exists(&self, path: &str) -> Result<bool>;

    /// Read a whole blob into memory. Reference files and detail
    /// documents are small enough for this.
    async fn get(&self, path: &str) -> Result<Vec<u8>>;

    /// Write a blob, replacing any existing content. Used to cache
    /// feature schemas fetched from their public location.
    async fn put(&self, path: &str, bytes: &[u8]) -> Result<()>;

    /// Open a blob as a blocking reader for streaming consumption.
    /// The index document is parsed without materializing it.
    async fn open(&self, path: &str) -> Result<Box<dyn Read + Send>>;
}

/// Blob store backed by a local directory tree.
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, path: &str) -> PathBuf {
        self.root.join(path)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn exists(&self, path: &str) -> Result<bool> {
        Ok(tokio::fs::try_exists(self.resolve(path)).await?)
    }

    async fn get(&self, path: &str) -> Result<Vec<u8>> {
        let full = self.resolve(path);
        tokio::fs::read(&full)
            .await
            .with_context(|| format!("Failed to read blob: {}", full.display()))
    }

    async fn put(&self, path: &str, bytes: &[u8]) -> Result<()> {
        let full = self.resolve(path);
        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create blob directory: {}", parent.display()))?;
        }
        tokio::fs::write(&full, bytes)
            .await
            .with_context(|| format!("Failed to write blob: {}", full.display()))
    }

    async fn open(&self, path: &str) -> Result<Box<dyn Read + Send>> {
        let full = self.resolve(path);
        let file = std::fs::File::open(&full)
            .with_context(|| format!("Failed to open blob: {}", full.display()))?;
        Ok(Box::new(file))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::assert_ok;

    #[tokio::test]
    async fn reads_blobs_relative_to_root() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("refs")).unwrap();
        std::fs::write(dir.path().join("refs/sample.xml"), b"<root/>").unwrap();

        let store = FsBlobStore::new(dir.path());
        assert!(store.exists("refs/sample.xml").await.unwrap());
        assert!(!store.exists("refs/other.xml").await.unwrap());
        assert_eq!(store.get("refs/sample.xml").await.unwrap(), b"<root/>");
    }

    #[tokio::test]
    async fn open_streams_blob_content() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("index.xml"), b"<files/>").unwrap();

        let store = FsBlobStore::new(dir.path());
        let mut reader = store.open("index.xml").await.unwrap();
        let mut buf = String::new();
        reader.read_to_string(&mut buf).unwrap();
        assert_eq!(buf, "<files/>");
    }

    #[tokio::test]
    async fn missing_blob_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(dir.path());
        assert!(store.get("missing.xml").await.is_err());
    }

    #[tokio::test]
    async fn put_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(dir.path());

        tokio_test::assert_ok!(store.put("schemas/new/display.json", b"{}").await);
        assert_eq!(store.get("schemas/new/display.json").await.unwrap(), b"{}");

        // Overwrite replaces the previous content.
        store.put("schemas/new/display.json", b"[]").await.unwrap();
        assert_eq!(store.get("schemas/new/display.json").await.unwrap(), b"[]");
    }
}
