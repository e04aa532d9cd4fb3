//! In-memory byte storage backend.
//!
//! Used for tests and ephemeral tenants. All data is lost when dropped.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::BTreeMap;

use crate::backend::error::{BackendError, BackendResult};
use crate::backend::ops::ByteStorage;
use crate::backend::types::FileAttr;
use crate::paths;

/// Node in the memory tree.
#[derive(Debug, Clone)]
enum Node {
    File { data: Vec<u8>, attr: FileAttr },
    Directory { attr: FileAttr },
}

impl Node {
    fn attr(&self) -> &FileAttr {
        match self {
            Node::File { attr, .. } => attr,
            Node::Directory { attr } => attr,
        }
    }

    fn is_dir(&self) -> bool {
        matches!(self, Node::Directory { .. })
    }
}

/// In-memory byte storage keyed by cleaned absolute path.
///
/// The map is ordered so a directory's subtree is a contiguous key range.
#[derive(Debug)]
pub struct MemoryBackend {
    nodes: RwLock<BTreeMap<String, Node>>,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    /// Create an empty tree holding only the root directory.
    pub fn new() -> Self {
        let mut nodes = BTreeMap::new();
        nodes.insert(
            paths::ROOT.to_string(),
            Node::Directory {
                attr: FileAttr::directory(0o755),
            },
        );
        Self {
            nodes: RwLock::new(nodes),
        }
    }

    /// Number of paths held, root included.
    pub fn len(&self) -> usize {
        self.nodes.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check_parent(nodes: &BTreeMap<String, Node>, path: &str) -> BackendResult<()> {
        let (parent, _) = paths::split(path);
        match nodes.get(parent) {
            Some(node) if node.is_dir() => Ok(()),
            Some(_) => Err(BackendError::not_a_directory(parent)),
            None => Err(BackendError::not_found(parent)),
        }
    }

    fn subtree_keys(nodes: &BTreeMap<String, Node>, dir: &str) -> Vec<String> {
        let prefix = paths::descendant_prefix(dir);
        nodes
            .range(prefix.clone()..)
            .take_while(|(k, _)| k.starts_with(&prefix))
            .map(|(k, _)| k.clone())
            .collect()
    }
}

#[async_trait]
impl ByteStorage for MemoryBackend {
    async fn stat(&self, path: &str) -> BackendResult<FileAttr> {
        let path = paths::clean(path);
        self.nodes
            .read()
            .get(&path)
            .map(|n| n.attr().clone())
            .ok_or_else(|| BackendError::not_found(path))
    }

    async fn mkdir(&self, path: &str, mode: u32) -> BackendResult<FileAttr> {
        let path = paths::clean(path);
        let mut nodes = self.nodes.write();

        if nodes.contains_key(&path) {
            return Err(BackendError::already_exists(path));
        }
        Self::check_parent(&nodes, &path)?;

        let attr = FileAttr::directory(mode);
        nodes.insert(path, Node::Directory { attr: attr.clone() });
        Ok(attr)
    }

    async fn mkdir_all(&self, path: &str, mode: u32) -> BackendResult<FileAttr> {
        let path = paths::clean(path);
        let mut nodes = self.nodes.write();

        let mut current = String::new();
        for segment in path.split(paths::SEPARATOR).filter(|s| !s.is_empty()) {
            current = paths::join(&current, segment);
            match nodes.get(&current) {
                Some(node) if node.is_dir() => {}
                Some(_) => return Err(BackendError::not_a_directory(current)),
                None => {
                    nodes.insert(
                        current.clone(),
                        Node::Directory {
                            attr: FileAttr::directory(mode),
                        },
                    );
                }
            }
        }

        nodes
            .get(&path)
            .map(|n| n.attr().clone())
            .ok_or_else(|| BackendError::not_found(path))
    }

    async fn create(&self, path: &str, mode: u32) -> BackendResult<FileAttr> {
        let path = paths::clean(path);
        let mut nodes = self.nodes.write();

        if nodes.contains_key(&path) {
            return Err(BackendError::already_exists(path));
        }
        Self::check_parent(&nodes, &path)?;

        let attr = FileAttr::file(0, mode);
        nodes.insert(
            path,
            Node::File {
                data: Vec::new(),
                attr: attr.clone(),
            },
        );
        Ok(attr)
    }

    async fn write(&self, path: &str, offset: u64, data: &[u8]) -> BackendResult<u32> {
        let path = paths::clean(path);
        let mut nodes = self.nodes.write();

        match nodes.get_mut(&path) {
            Some(Node::File {
                data: file_data,
                attr,
            }) => {
                let offset = offset as usize;
                if offset + data.len() > file_data.len() {
                    file_data.resize(offset + data.len(), 0);
                }
                file_data[offset..offset + data.len()].copy_from_slice(data);
                attr.touch(file_data.len() as u64);
                Ok(data.len() as u32)
            }
            Some(Node::Directory { .. }) => Err(BackendError::is_a_directory(path)),
            None => Err(BackendError::not_found(path)),
        }
    }

    async fn read(&self, path: &str, offset: u64, size: u32) -> BackendResult<Vec<u8>> {
        let path = paths::clean(path);
        let nodes = self.nodes.read();

        match nodes.get(&path) {
            Some(Node::File { data, .. }) => {
                let start = (offset as usize).min(data.len());
                let end = (start + size as usize).min(data.len());
                Ok(data[start..end].to_vec())
            }
            Some(Node::Directory { .. }) => Err(BackendError::is_a_directory(path)),
            None => Err(BackendError::not_found(path)),
        }
    }

    async fn remove(&self, path: &str) -> BackendResult<()> {
        let path = paths::clean(path);
        if path == paths::ROOT {
            return Err(BackendError::permission_denied("cannot remove root"));
        }

        let mut nodes = self.nodes.write();
        match nodes.get(&path) {
            Some(Node::Directory { .. }) => {
                if !Self::subtree_keys(&nodes, &path).is_empty() {
                    return Err(BackendError::directory_not_empty(path));
                }
            }
            Some(Node::File { .. }) => {}
            None => return Err(BackendError::not_found(path)),
        }
        nodes.remove(&path);
        Ok(())
    }

    async fn rename(&self, from: &str, to: &str) -> BackendResult<()> {
        let from = paths::clean(from);
        let to = paths::clean(to);
        if from == paths::ROOT {
            return Err(BackendError::permission_denied("cannot move root"));
        }
        if paths::is_strict_descendant(&to, &from) {
            return Err(BackendError::invalid_path(format!(
                "cannot move {from} into itself ({to})"
            )));
        }

        let mut nodes = self.nodes.write();
        if !nodes.contains_key(&from) {
            return Err(BackendError::not_found(from));
        }
        if nodes.contains_key(&to) {
            return Err(BackendError::already_exists(to));
        }
        Self::check_parent(&nodes, &to)?;

        for child in Self::subtree_keys(&nodes, &from) {
            if let Some(node) = nodes.remove(&child) {
                if let Some(moved) = paths::rebase(&child, &from, &to) {
                    nodes.insert(moved, node);
                }
            }
        }
        if let Some(node) = nodes.remove(&from) {
            nodes.insert(to, node);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_and_read() {
        let fs = MemoryBackend::new();
        fs.create("/test.txt", 0o644).await.unwrap();
        fs.write("/test.txt", 0, b"hello world").await.unwrap();

        let data = fs.read("/test.txt", 6, 5).await.unwrap();
        assert_eq!(data, b"world");
        assert_eq!(fs.read_all("/test.txt").await.unwrap(), b"hello world");
    }

    #[tokio::test]
    async fn test_mkdir_requires_parent() {
        let fs = MemoryBackend::new();
        let err = fs.mkdir("/a/b", 0o755).await.unwrap_err();
        assert!(err.is_not_found());

        fs.mkdir("/a", 0o755).await.unwrap();
        fs.mkdir("/a/b", 0o755).await.unwrap();
        assert!(matches!(
            fs.mkdir("/a/b", 0o755).await,
            Err(BackendError::AlreadyExists(_))
        ));
    }

    #[tokio::test]
    async fn test_mkdir_all() {
        let fs = MemoryBackend::new();
        fs.mkdir_all("/a/b/c", 0o755).await.unwrap();
        assert!(fs.stat("/a").await.unwrap().is_dir());
        assert!(fs.stat("/a/b/c").await.unwrap().is_dir());

        // Idempotent, including on the root.
        fs.mkdir_all("/a/b/c", 0o755).await.unwrap();
        fs.mkdir_all("/", 0o755).await.unwrap();
    }

    #[tokio::test]
    async fn test_remove() {
        let fs = MemoryBackend::new();
        fs.mkdir("/dir", 0o755).await.unwrap();
        fs.create("/dir/file", 0o644).await.unwrap();

        assert!(matches!(
            fs.remove("/dir").await,
            Err(BackendError::DirectoryNotEmpty(_))
        ));
        fs.remove("/dir/file").await.unwrap();
        fs.remove("/dir").await.unwrap();
        assert!(!fs.exists("/dir").await);
        assert!(fs.remove("/").await.is_err());
    }

    #[tokio::test]
    async fn test_rename_moves_subtree() {
        let fs = MemoryBackend::new();
        fs.mkdir_all("/a/x/y", 0o755).await.unwrap();
        fs.create("/a/x/file", 0o644).await.unwrap();
        fs.mkdir("/ab", 0o755).await.unwrap();

        fs.rename("/a", "/z").await.unwrap();

        assert!(!fs.exists("/a").await);
        assert!(!fs.exists("/a/x/y").await);
        assert!(fs.stat("/z/x/y").await.unwrap().is_dir());
        assert!(fs.stat("/z/x/file").await.unwrap().is_file());
        // Sibling sharing a name prefix is untouched.
        assert!(fs.exists("/ab").await);
    }

    #[tokio::test]
    async fn test_rename_refuses_overwrite_and_self_nesting() {
        let fs = MemoryBackend::new();
        fs.mkdir("/a", 0o755).await.unwrap();
        fs.mkdir("/b", 0o755).await.unwrap();

        assert!(matches!(
            fs.rename("/a", "/b").await,
            Err(BackendError::AlreadyExists(_))
        ));
        assert!(matches!(
            fs.rename("/a", "/a/inner").await,
            Err(BackendError::InvalidPath(_))
        ));
    }

    #[tokio::test]
    async fn test_path_normalization() {
        let fs = MemoryBackend::new();
        fs.mkdir("/a", 0o755).await.unwrap();
        fs.create("/a/c.txt", 0o644).await.unwrap();

        assert!(fs.stat("a/c.txt").await.is_ok());
        assert!(fs.stat("/a/./c.txt").await.is_ok());
        assert!(fs.stat("/a/b/../c.txt").await.is_ok());
    }
}
