//! # cumulus-vfs
//!
//! Hierarchical filesystem layer of a personal cloud.
//!
//! Directory and file records live in a document store with optimistic
//! revisions; file content and the directory skeleton live in a byte
//! storage backend. The two are kept in step by the operations in
//! [`tree`]:
//!
//! - Directories persist their absolute path, derived once from the
//!   `folder_id` chain and rewritten for the whole subtree on a move
//! - Files are addressed by `(folder_id, name)`; their path is derived
//! - A bounded [`PathCache`] resolves ids and paths without re-querying
//!
//! ```no_run
//! # async fn demo() -> cumulus_vfs::FsResult<()> {
//! use cumulus_vfs::{DirRecord, DocPatch, VfsConfig, VfsContext, tree};
//!
//! let ctx = VfsContext::in_memory(VfsConfig::default());
//! tree::create_root(&ctx).await?;
//!
//! let mut docs = DirRecord::new("docs", "", Vec::new())?;
//! tree::create_directory(&ctx, &mut docs).await?;
//! let moved = tree::modify_dir_metadata(&ctx, &docs, &DocPatch::new().rename("documents")).await?;
//! assert_eq!(moved.path, "/documents");
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod cache;
pub mod config;
pub mod context;
pub mod entry;
pub mod error;
pub mod paths;
pub mod store;
pub mod tree;

pub use backend::{BackendError, BackendResult, ByteStorage, FileAttr, FileType, LocalBackend, MemoryBackend};
pub use cache::{MAX_PATH_DEPTH, PathCache};
pub use config::{ConfigError, DEFAULT_DOCTYPE, VfsConfig};
pub use context::VfsContext;
pub use entry::{
    AnyRecord, Children, DirRecord, DocPatch, EntryKind, FileRecord, MAX_NAME_LEN, ROOT_DIR_ID,
    Record,
};
pub use error::{ErrorKind, FsError, FsResult};
pub use store::{DocumentStore, FindRequest, MemoryStore, Selector, SqliteStore, StoreError, StoreResult};
