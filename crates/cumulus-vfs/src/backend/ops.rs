//! Byte storage operations trait.

use async_trait::async_trait;

use super::BackendResult;
use super::types::FileAttr;

/// Raw content storage addressed by absolute, `/`-separated logical paths.
///
/// The directory tree keeps its records in the document store; this trait
/// only holds the bytes and the directory skeleton they live in. Backends
/// map logical paths under their own root.
#[async_trait]
pub trait ByteStorage: Send + Sync {
    /// Get attributes of the object at `path`.
    ///
    /// Missing paths fail with an error for which
    /// [`BackendError::is_not_found`](super::BackendError::is_not_found) holds.
    async fn stat(&self, path: &str) -> BackendResult<FileAttr>;

    /// Create a single directory. The parent must exist; the target must not.
    async fn mkdir(&self, path: &str, mode: u32) -> BackendResult<FileAttr>;

    /// Create a directory and any missing ancestors. Succeeds if it exists.
    async fn mkdir_all(&self, path: &str, mode: u32) -> BackendResult<FileAttr>;

    /// Create an empty file. The parent must exist; the target must not.
    async fn create(&self, path: &str, mode: u32) -> BackendResult<FileAttr>;

    /// Write `data` at `offset`, extending the file as needed.
    async fn write(&self, path: &str, offset: u64, data: &[u8]) -> BackendResult<u32>;

    /// Read up to `size` bytes starting at `offset`.
    async fn read(&self, path: &str, offset: u64, size: u32) -> BackendResult<Vec<u8>>;

    /// Remove a file or an empty directory.
    async fn remove(&self, path: &str) -> BackendResult<()>;

    /// Move a file or directory (with its contents) to a new path.
    async fn rename(&self, from: &str, to: &str) -> BackendResult<()>;

    /// Check if a path exists.
    async fn exists(&self, path: &str) -> bool {
        self.stat(path).await.is_ok()
    }

    /// Read entire file contents.
    async fn read_all(&self, path: &str) -> BackendResult<Vec<u8>> {
        let attr = self.stat(path).await?;
        self.read(path, 0, attr.size as u32).await
    }
}
