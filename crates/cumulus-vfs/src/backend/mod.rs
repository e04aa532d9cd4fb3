//! Byte storage backends.
//!
//! The directory tree stores records in the document store and content
//! here. Key components:
//!
//! - [`ByteStorage`] - the narrow trait the tree drives (`mkdir`, `rename`, `stat`, ...)
//! - [`MemoryBackend`] - in-memory tree (tests, ephemeral tenants)
//! - [`LocalBackend`] - host directory per tenant, with escape protection

mod error;
mod local;
mod memory;
mod ops;
mod types;

pub use error::{BackendError, BackendResult};
pub use local::LocalBackend;
pub use memory::MemoryBackend;
pub use ops::ByteStorage;
pub use types::{FileAttr, FileType};
