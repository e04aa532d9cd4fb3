//! Tenant-level tuning for the tree.
//!
//! Loaded from RON, e.g.:
//!
//! ```ron
//! (
//!     cache_capacity: 4096,
//!     children_limit: 200,
//! )
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default document type for tree records.
pub const DEFAULT_DOCTYPE: &str = "cumulus.files";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VfsConfig {
    /// Entries held per cache kind (directories and files each get this many).
    pub cache_capacity: usize,
    /// Page size for fetching a directory's children.
    pub children_limit: usize,
    /// Collection the records live in.
    pub doctype: String,
}

impl Default for VfsConfig {
    fn default() -> Self {
        Self {
            cache_capacity: 1024,
            children_limit: 100,
            doctype: DEFAULT_DOCTYPE.to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("RON parse error: {0}")]
    Ron(#[from] ron::error::SpannedError),
    #[error("invalid config: {0}")]
    Invalid(String),
}

impl VfsConfig {
    /// Parse and validate a RON document. Omitted fields take defaults.
    pub fn from_ron(text: &str) -> Result<Self, ConfigError> {
        let config: VfsConfig = ron::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cache_capacity == 0 {
            return Err(ConfigError::Invalid("cache_capacity must be > 0".into()));
        }
        if self.children_limit == 0 {
            return Err(ConfigError::Invalid("children_limit must be > 0".into()));
        }
        if self.doctype.is_empty() {
            return Err(ConfigError::Invalid("doctype must not be empty".into()));
        }
        Ok(())
    }

    pub fn with_cache_capacity(mut self, capacity: usize) -> Self {
        self.cache_capacity = capacity;
        self
    }
}
