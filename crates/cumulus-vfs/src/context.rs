//! Per-tenant handle bundling the store, byte storage, cache and config.

use std::sync::Arc;

use crate::backend::{ByteStorage, MemoryBackend};
use crate::cache::PathCache;
use crate::config::VfsConfig;
use crate::store::{DocumentStore, MemoryStore};

/// Everything a tree operation needs. Cheap to clone; never mutated after
/// construction.
#[derive(Clone)]
pub struct VfsContext {
    store: Arc<dyn DocumentStore>,
    fs: Arc<dyn ByteStorage>,
    cache: Arc<PathCache>,
    config: Arc<VfsConfig>,
}

impl std::fmt::Debug for VfsContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VfsContext")
            .field("cache", &self.cache)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl VfsContext {
    pub fn new(store: Arc<dyn DocumentStore>, fs: Arc<dyn ByteStorage>, config: VfsConfig) -> Self {
        let cache = Arc::new(PathCache::new(store.clone(), &config));
        Self {
            store,
            fs,
            cache,
            config: Arc::new(config),
        }
    }

    /// Context over a [`MemoryStore`] and a [`MemoryBackend`].
    pub fn in_memory(config: VfsConfig) -> Self {
        Self::new(
            Arc::new(MemoryStore::new()),
            Arc::new(MemoryBackend::new()),
            config,
        )
    }

    pub fn store(&self) -> &dyn DocumentStore {
        self.store.as_ref()
    }

    pub fn fs(&self) -> &dyn ByteStorage {
        self.fs.as_ref()
    }

    pub fn cache(&self) -> &PathCache {
        &self.cache
    }

    pub fn config(&self) -> &VfsConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_cache() {
        let ctx = VfsContext::in_memory(VfsConfig::default().with_cache_capacity(7));
        let other = ctx.clone();
        assert!(std::ptr::eq(ctx.cache(), other.cache()));
        assert_eq!(other.config().cache_capacity, 7);
        assert_eq!(ctx.cache().doctype(), "cumulus.files");
    }
}
