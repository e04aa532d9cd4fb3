//! Tenant content on the host filesystem.
//!
//! Each tenant gets one host directory; logical paths are resolved beneath
//! it and refused if a symlink would carry them outside.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;

use crate::backend::error::{BackendError, BackendResult};
use crate::backend::ops::ByteStorage;
use crate::backend::types::FileAttr;
use crate::paths;

/// Byte storage under one host directory: with a root of
/// `/var/lib/cumulus/alice`, `/docs/a.txt` lands at
/// `/var/lib/cumulus/alice/docs/a.txt`.
#[derive(Debug, Clone)]
pub struct LocalBackend {
    root: PathBuf,
}

impl LocalBackend {
    /// Root the backend at `root`, canonicalized so later prefix checks see
    /// through symlinked temp dirs.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root: PathBuf = root.into();
        let root = dunce::canonicalize(&root).unwrap_or(root);
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a logical path to a host path within the root.
    fn resolve(&self, path: &str) -> BackendResult<PathBuf> {
        let cleaned = paths::clean(path);
        let relative = cleaned.trim_start_matches(paths::SEPARATOR);
        if relative.is_empty() {
            return Ok(self.root.clone());
        }

        let full = self.root.join(relative);

        // Lexical cleaning removed `..`; a symlinked ancestor can still
        // point outside, so check the nearest existing ancestor.
        let mut ancestor = full.as_path();
        while !ancestor.exists() {
            match ancestor.parent() {
                Some(parent) => ancestor = parent,
                None => break,
            }
        }
        if ancestor.exists() {
            let canonical = dunce::canonicalize(ancestor)?;
            if !canonical.starts_with(&self.root) {
                return Err(BackendError::path_escapes_root(format!(
                    "{} is not under {}",
                    canonical.display(),
                    self.root.display()
                )));
            }
        }

        Ok(full)
    }

    async fn require_dir(path: &Path) -> BackendResult<()> {
        let meta = fs::metadata(path).await?;
        if meta.is_dir() {
            Ok(())
        } else {
            Err(BackendError::not_a_directory(path.display().to_string()))
        }
    }
}

#[async_trait]
impl ByteStorage for LocalBackend {
    async fn stat(&self, path: &str) -> BackendResult<FileAttr> {
        let full_path = self.resolve(path)?;
        let meta = fs::metadata(&full_path).await?;
        Ok(FileAttr::from(&meta))
    }

    async fn mkdir(&self, path: &str, mode: u32) -> BackendResult<FileAttr> {
        use std::os::unix::fs::DirBuilderExt;

        let full_path = self.resolve(path)?;
        std::fs::DirBuilder::new().mode(mode).create(&full_path)?;

        let meta = fs::metadata(&full_path).await?;
        Ok(FileAttr::from(&meta))
    }

    async fn mkdir_all(&self, path: &str, mode: u32) -> BackendResult<FileAttr> {
        use std::os::unix::fs::DirBuilderExt;

        let full_path = self.resolve(path)?;
        std::fs::DirBuilder::new()
            .mode(mode)
            .recursive(true)
            .create(&full_path)?;

        let meta = fs::metadata(&full_path).await?;
        Ok(FileAttr::from(&meta))
    }

    async fn create(&self, path: &str, mode: u32) -> BackendResult<FileAttr> {
        use std::os::unix::fs::OpenOptionsExt;

        let full_path = self.resolve(path)?;
        if let Some(parent) = full_path.parent() {
            Self::require_dir(parent).await?;
        }

        let file = std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .mode(mode)
            .open(&full_path)?;

        let meta = file.metadata()?;
        Ok(FileAttr::from(&meta))
    }

    async fn write(&self, path: &str, offset: u64, data: &[u8]) -> BackendResult<u32> {
        use tokio::io::{AsyncSeekExt, AsyncWriteExt};

        let full_path = self.resolve(path)?;
        let mut file = fs::OpenOptions::new().write(true).open(&full_path).await?;

        file.seek(std::io::SeekFrom::Start(offset)).await?;
        file.write_all(data).await?;
        file.flush().await?;

        Ok(data.len() as u32)
    }

    async fn read(&self, path: &str, offset: u64, size: u32) -> BackendResult<Vec<u8>> {
        use tokio::io::{AsyncReadExt, AsyncSeekExt};

        let full_path = self.resolve(path)?;
        let mut file = fs::File::open(&full_path).await?;

        file.seek(std::io::SeekFrom::Start(offset)).await?;

        let mut buffer = Vec::with_capacity(size as usize);
        file.take(size as u64).read_to_end(&mut buffer).await?;
        Ok(buffer)
    }

    async fn remove(&self, path: &str) -> BackendResult<()> {
        let full_path = self.resolve(path)?;
        if full_path == self.root {
            return Err(BackendError::permission_denied("cannot remove root"));
        }

        let meta = fs::metadata(&full_path).await?;
        if meta.is_dir() {
            let mut entries = fs::read_dir(&full_path).await?;
            if entries.next_entry().await?.is_some() {
                return Err(BackendError::directory_not_empty(path));
            }
            fs::remove_dir(&full_path).await?;
        } else {
            fs::remove_file(&full_path).await?;
        }
        Ok(())
    }

    async fn rename(&self, from: &str, to: &str) -> BackendResult<()> {
        let from_path = self.resolve(from)?;
        let to_path = self.resolve(to)?;
        if from_path == self.root {
            return Err(BackendError::permission_denied("cannot move root"));
        }
        if to_path.starts_with(&from_path) {
            return Err(BackendError::invalid_path(format!(
                "cannot move {from} into itself ({to})"
            )));
        }
        // fs::rename silently replaces an empty directory on unix.
        if fs::try_exists(&to_path).await? {
            return Err(BackendError::already_exists(to));
        }
        if let Some(parent) = to_path.parent() {
            Self::require_dir(parent).await?;
        }

        fs::rename(&from_path, &to_path).await?;
        Ok(())
    }
}
