//! What `stat` reports about a backend path.

use std::os::unix::fs::PermissionsExt;
use std::time::SystemTime;

/// Directory or regular file. Backends hold nothing else.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    File,
    Directory,
}

#[derive(Debug, Clone)]
pub struct FileAttr {
    pub size: u64,
    pub kind: FileType,
    /// Permission bits only (`0o7777` mask).
    pub perm: u32,
    pub mtime: SystemTime,
}

impl FileAttr {
    pub fn file(size: u64, perm: u32) -> Self {
        Self::stamped(FileType::File, size, perm)
    }

    pub fn directory(perm: u32) -> Self {
        Self::stamped(FileType::Directory, 0, perm)
    }

    fn stamped(kind: FileType, size: u64, perm: u32) -> Self {
        Self {
            size,
            kind,
            perm: perm & 0o7777,
            mtime: SystemTime::now(),
        }
    }

    /// Record a content change of `size` bytes.
    pub fn touch(&mut self, size: u64) {
        self.size = size;
        self.mtime = SystemTime::now();
    }

    pub fn is_file(&self) -> bool {
        self.kind == FileType::File
    }

    pub fn is_dir(&self) -> bool {
        self.kind == FileType::Directory
    }
}

impl From<&std::fs::Metadata> for FileAttr {
    fn from(meta: &std::fs::Metadata) -> Self {
        let kind = if meta.is_dir() {
            FileType::Directory
        } else {
            FileType::File
        };
        Self {
            size: meta.len(),
            kind,
            perm: meta.permissions().mode() & 0o7777,
            mtime: meta.modified().unwrap_or(SystemTime::UNIX_EPOCH),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_perm_is_masked() {
        let dir = FileAttr::directory(0o40755);
        assert!(dir.is_dir());
        assert_eq!(dir.perm, 0o755);
        assert_eq!(dir.size, 0);
    }

    #[test]
    fn test_touch_updates_size() {
        let mut file = FileAttr::file(0, 0o644);
        let before = file.mtime;
        file.touch(12);
        assert!(file.is_file());
        assert_eq!(file.size, 12);
        assert!(file.mtime >= before);
    }
}
