//! Tree-level error taxonomy.

use thiserror::Error;

use crate::backend::BackendError;
use crate::store::StoreError;

/// Errors returned by tree operations and the path cache.
#[derive(Debug, Error)]
pub enum FsError {
    /// No record at the given path or id.
    #[error("no such file or directory: {0}")]
    NotExist(String),

    /// A `folder_id` points at no directory while deriving a path.
    #[error("parent directory does not exist: {0}")]
    ParentMissing(String),

    /// The record exists but is the other kind.
    #[error("{id} is a {found}, expected a {expected}")]
    WrongType {
        id: String,
        expected: &'static str,
        found: &'static str,
    },

    /// Rename would nest a directory inside itself or a descendant.
    #[error("cannot move {from} into {to}")]
    ForbiddenMove { from: String, to: String },

    /// Target path already occupied.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// The presented revision is stale.
    #[error("revision conflict on {0}")]
    RevisionConflict(String),

    /// Leaf name is empty, a dot segment, or contains a separator.
    #[error("invalid name: {0:?}")]
    InvalidName(String),

    /// Metadata patch is inconsistent with the record.
    #[error("invalid patch: {0}")]
    InvalidPatch(String),

    /// A path that must be absolute is not.
    #[error("invalid path: {0}")]
    InvalidPath(String),

    /// Secondary index points at an id missing from the primary cache.
    #[error("path cache inconsistency: {0}")]
    CacheInconsistency(String),

    /// Byte storage failure, passed through.
    #[error("storage backend: {0}")]
    Backend(#[from] BackendError),

    /// Document store failure other than not-found/conflict.
    #[error("document store: {0}")]
    Store(StoreError),

    /// A propagation task died before reporting.
    #[error("task failed: {0}")]
    Task(String),
}

/// Client-facing category an API layer maps each error onto.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    BadRequest,
    Conflict,
    NotFound,
    Internal,
}

impl FsError {
    pub fn not_exist(what: impl Into<String>) -> Self {
        Self::NotExist(what.into())
    }

    pub fn parent_missing(id: impl Into<String>) -> Self {
        Self::ParentMissing(id.into())
    }

    pub fn invalid_name(name: impl Into<String>) -> Self {
        Self::InvalidName(name.into())
    }

    pub fn invalid_patch(msg: impl Into<String>) -> Self {
        Self::InvalidPatch(msg.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            FsError::NotExist(_) | FsError::ParentMissing(_) => ErrorKind::NotFound,
            FsError::WrongType { .. }
            | FsError::ForbiddenMove { .. }
            | FsError::InvalidName(_)
            | FsError::InvalidPatch(_)
            | FsError::InvalidPath(_) => ErrorKind::BadRequest,
            FsError::AlreadyExists(_) | FsError::RevisionConflict(_) => ErrorKind::Conflict,
            FsError::CacheInconsistency(_)
            | FsError::Backend(_)
            | FsError::Store(_)
            | FsError::Task(_) => ErrorKind::Internal,
        }
    }
}

impl From<StoreError> for FsError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound { id, .. } => FsError::NotExist(id),
            StoreError::Conflict { id, .. } => FsError::RevisionConflict(id),
            other => FsError::Store(other),
        }
    }
}

/// Tree result type.
pub type FsResult<T> = Result<T, FsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_errors_map_to_taxonomy() {
        let err: FsError = StoreError::conflict("t", "a").into();
        assert!(matches!(err, FsError::RevisionConflict(ref id) if id == "a"));
        assert_eq!(err.kind(), ErrorKind::Conflict);

        let err: FsError = StoreError::not_found("t", "b").into();
        assert!(matches!(err, FsError::NotExist(_)));
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let err: FsError = StoreError::invalid("nope").into();
        assert_eq!(err.kind(), ErrorKind::Internal);
    }

    #[test]
    fn test_kinds() {
        let forbidden = FsError::ForbiddenMove {
            from: "/a".into(),
            to: "/a/b".into(),
        };
        assert_eq!(forbidden.kind(), ErrorKind::BadRequest);
        assert_eq!(FsError::AlreadyExists("/x".into()).kind(), ErrorKind::Conflict);
        assert_eq!(
            FsError::from(BackendError::other("disk")).kind(),
            ErrorKind::Internal
        );
    }
}
