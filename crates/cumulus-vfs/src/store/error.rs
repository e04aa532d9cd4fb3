//! Document store error types.

use thiserror::Error;

/// Errors raised by a [`DocumentStore`](super::DocumentStore).
#[derive(Debug, Error)]
pub enum StoreError {
    /// No document with this id.
    #[error("document not found: {doctype}/{id}")]
    NotFound { doctype: String, id: String },

    /// The presented revision is not the current one, or the id is taken.
    #[error("revision conflict: {doctype}/{id}")]
    Conflict { doctype: String, id: String },

    /// The document is not a JSON object, or lacks `_id`/`_rev` where required.
    #[error("invalid document: {0}")]
    InvalidDocument(String),

    /// JSON (de)serialization failed.
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// SQLite failure.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

impl StoreError {
    pub fn not_found(doctype: &str, id: &str) -> Self {
        Self::NotFound {
            doctype: doctype.to_string(),
            id: id.to_string(),
        }
    }

    pub fn conflict(doctype: &str, id: &str) -> Self {
        Self::Conflict {
            doctype: doctype.to_string(),
            id: id.to_string(),
        }
    }

    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidDocument(msg.into())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict { .. })
    }
}

/// Document store result type.
pub type StoreResult<T> = Result<T, StoreError>;
