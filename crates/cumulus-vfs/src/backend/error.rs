//! Byte storage errors.

use std::io;
use thiserror::Error;

/// Failure from a [`ByteStorage`](super::ByteStorage) call. Every variant but
/// `Io` carries the logical path (or a short reason) it concerns.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("no such path: {0}")]
    NotFound(String),
    #[error("path is occupied: {0}")]
    AlreadyExists(String),
    #[error("not permitted: {0}")]
    PermissionDenied(String),
    #[error("parent is not a directory: {0}")]
    NotADirectory(String),
    #[error("expected a file, found a directory: {0}")]
    IsADirectory(String),
    #[error("directory has entries: {0}")]
    DirectoryNotEmpty(String),
    #[error("resolves outside the storage root: {0}")]
    PathEscapesRoot(String),
    #[error("malformed path: {0}")]
    InvalidPath(String),
    #[error("storage I/O: {0}")]
    Io(io::Error),
    #[error("{0}")]
    Other(String),
}

macro_rules! constructors {
    ($($name:ident => $variant:ident),* $(,)?) => {
        $(
            pub fn $name(what: impl Into<String>) -> Self {
                Self::$variant(what.into())
            }
        )*
    };
}

impl BackendError {
    constructors! {
        not_found => NotFound,
        already_exists => AlreadyExists,
        permission_denied => PermissionDenied,
        not_a_directory => NotADirectory,
        is_a_directory => IsADirectory,
        directory_not_empty => DirectoryNotEmpty,
        path_escapes_root => PathEscapesRoot,
        invalid_path => InvalidPath,
        other => Other,
    }

    /// The closest `io::ErrorKind`.
    pub fn io_kind(&self) -> io::ErrorKind {
        match self {
            Self::NotFound(_) => io::ErrorKind::NotFound,
            Self::AlreadyExists(_) => io::ErrorKind::AlreadyExists,
            Self::PermissionDenied(_) | Self::PathEscapesRoot(_) => io::ErrorKind::PermissionDenied,
            Self::NotADirectory(_) => io::ErrorKind::NotADirectory,
            Self::IsADirectory(_) => io::ErrorKind::IsADirectory,
            Self::DirectoryNotEmpty(_) => io::ErrorKind::DirectoryNotEmpty,
            Self::InvalidPath(_) => io::ErrorKind::InvalidInput,
            Self::Io(e) => e.kind(),
            Self::Other(_) => io::ErrorKind::Other,
        }
    }

    /// Nothing lives at the path, whichever backend said so.
    pub fn is_not_found(&self) -> bool {
        self.io_kind() == io::ErrorKind::NotFound
    }
}

/// Host errors fold into the variants the tree matches on, so a local
/// `ENOENT` reads the same as a memory-backend miss.
impl From<io::Error> for BackendError {
    fn from(e: io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::NotFound => Self::NotFound(e.to_string()),
            io::ErrorKind::AlreadyExists => Self::AlreadyExists(e.to_string()),
            io::ErrorKind::PermissionDenied => Self::PermissionDenied(e.to_string()),
            _ => Self::Io(e),
        }
    }
}

impl From<BackendError> for io::Error {
    fn from(e: BackendError) -> Self {
        match e {
            BackendError::Io(inner) => inner,
            other => io::Error::new(other.io_kind(), other.to_string()),
        }
    }
}

pub type BackendResult<T> = Result<T, BackendError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_not_found_folds_in() {
        let err: BackendError = io::Error::new(io::ErrorKind::NotFound, "gone").into();
        assert!(err.is_not_found());
        assert!(matches!(err, BackendError::NotFound(_)));

        let raw: BackendError = io::Error::new(io::ErrorKind::TimedOut, "slow").into();
        assert!(matches!(raw, BackendError::Io(_)));
        assert!(!raw.is_not_found());
    }

    #[test]
    fn test_io_bridge_keeps_kind() {
        let err: io::Error = BackendError::already_exists("/a").into();
        assert_eq!(err.kind(), io::ErrorKind::AlreadyExists);
        assert!(err.to_string().contains("/a"));

        let err: io::Error = BackendError::path_escapes_root("/../x").into();
        assert_eq!(err.kind(), io::ErrorKind::PermissionDenied);
    }
}
