//! Path cache over the document store.
//!
//! Two bounded LRUs, one per record kind. Directories are indexed by path,
//! files by `(folder_id, name)`. Every write goes to the store first; the
//! cache only ever holds records the store has accepted.
//!
//! Locks are `parking_lot` mutexes taken for the duration of one in-memory
//! touch and never held across an `.await`.

mod lru;

use parking_lot::Mutex;
use std::sync::Arc;
use tracing::debug;

use crate::config::VfsConfig;
use crate::entry::{AnyRecord, DirRecord, EntryKind, FileRecord, Record};
use crate::error::{FsError, FsResult};
use crate::paths;
use crate::store::{
    self, DocumentStore, FindRequest, Selector, create_doc, create_named_doc, update_doc,
};

pub use lru::{IndexLookup, Indexed, IndexedLru};

/// Deepest parent chain a path walk will follow before giving up.
pub const MAX_PATH_DEPTH: usize = 4096;

impl Indexed for DirRecord {
    type Key = String;

    fn primary_key(&self) -> &str {
        &self.id
    }

    fn index_key(&self) -> Option<String> {
        (!self.path.is_empty()).then(|| self.path.clone())
    }

    fn generation(&self) -> u64 {
        store::rev_generation(&self.rev)
    }
}

impl Indexed for FileRecord {
    type Key = (String, String);

    fn primary_key(&self) -> &str {
        &self.id
    }

    fn index_key(&self) -> Option<(String, String)> {
        Some((self.folder_id.clone(), self.name.clone()))
    }

    fn generation(&self) -> u64 {
        store::rev_generation(&self.rev)
    }
}

/// Id- and path-addressed view of the tree's records.
pub struct PathCache {
    store: Arc<dyn DocumentStore>,
    doctype: String,
    dirs: Mutex<IndexedLru<DirRecord>>,
    files: Mutex<IndexedLru<FileRecord>>,
}

impl std::fmt::Debug for PathCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PathCache")
            .field("doctype", &self.doctype)
            .field("dirs", &self.dirs.lock().len())
            .field("files", &self.files.lock().len())
            .finish()
    }
}

impl PathCache {
    pub fn new(store: Arc<dyn DocumentStore>, config: &VfsConfig) -> Self {
        Self {
            store,
            doctype: config.doctype.clone(),
            dirs: Mutex::new(IndexedLru::new(config.cache_capacity)),
            files: Mutex::new(IndexedLru::new(config.cache_capacity)),
        }
    }

    pub fn store(&self) -> &dyn DocumentStore {
        self.store.as_ref()
    }

    pub fn doctype(&self) -> &str {
        &self.doctype
    }

    /// Entries held across both caches.
    pub fn len(&self) -> usize {
        self.dirs.lock().len() + self.files.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains_dir(&self, id: &str) -> bool {
        self.dirs.lock().contains(id)
    }

    pub fn contains_file(&self, id: &str) -> bool {
        self.files.lock().contains(id)
    }

    // ---- lookups ----

    pub async fn dir_by_id(&self, id: &str) -> FsResult<DirRecord> {
        let cached = self.dirs.lock().get(id);
        if let Some(dir) = cached {
            return Ok(dir);
        }
        debug!(id = %id, "dir cache miss");
        let dir: DirRecord = narrow(id, self.fetch(id).await?)?;
        self.touch_dir(&dir);
        Ok(dir)
    }

    pub async fn file_by_id(&self, id: &str) -> FsResult<FileRecord> {
        let cached = self.files.lock().get(id);
        if let Some(file) = cached {
            return Ok(file);
        }
        debug!(id = %id, "file cache miss");
        let file: FileRecord = narrow(id, self.fetch(id).await?)?;
        self.touch_file(&file);
        Ok(file)
    }

    /// Look an id up in either cache, then the store.
    pub async fn dir_or_file_by_id(&self, id: &str) -> FsResult<AnyRecord> {
        let cached = self.dirs.lock().get(id);
        if let Some(dir) = cached {
            return Ok(AnyRecord::Dir(dir));
        }
        let cached = self.files.lock().get(id);
        if let Some(file) = cached {
            return Ok(AnyRecord::File(file));
        }
        debug!(id = %id, "cache miss");
        let record = self.fetch(id).await?;
        match &record {
            AnyRecord::Dir(dir) => self.touch_dir(dir),
            AnyRecord::File(file) => self.touch_file(file),
        }
        Ok(record)
    }

    pub async fn dir_by_path(&self, path: &str) -> FsResult<DirRecord> {
        let path = paths::clean(path);
        let cached = self.dirs.lock().get_by_key(&path);
        match cached {
            IndexLookup::Hit(dir) => return Ok(dir),
            IndexLookup::Dangling(id) => {
                return Err(FsError::CacheInconsistency(format!(
                    "path {path} indexed to uncached id {id}"
                )));
            }
            IndexLookup::Miss => {}
        }

        debug!(path = %path, "dir cache miss");
        let req = FindRequest::new(Selector::and([
            Selector::eq("path", path.as_str()),
            Selector::eq("type", EntryKind::Directory.to_string()),
        ]))
        .with_limit(1);
        let dir: DirRecord = store::find_docs(self.store(), &self.doctype, &req)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| FsError::not_exist(&path))?;
        self.touch_dir(&dir);
        Ok(dir)
    }

    pub async fn file_by_path(&self, path: &str) -> FsResult<FileRecord> {
        let path = paths::clean(path);
        let (parent, name) = paths::split(&path);
        if name.is_empty() {
            return Err(wrong_type(&path, EntryKind::File, EntryKind::Directory));
        }
        let parent = self.dir_by_path(parent).await?;

        let key = (parent.id.clone(), name.to_string());
        let cached = self.files.lock().get_by_key(&key);
        match cached {
            IndexLookup::Hit(file) => return Ok(file),
            IndexLookup::Dangling(id) => {
                return Err(FsError::CacheInconsistency(format!(
                    "file {path} indexed to uncached id {id}"
                )));
            }
            IndexLookup::Miss => {}
        }

        debug!(path = %path, "file cache miss");
        let req = FindRequest::new(Selector::and([
            Selector::eq("folder_id", parent.id.as_str()),
            Selector::eq("name", name),
            Selector::eq("type", EntryKind::File.to_string()),
        ]))
        .with_limit(1);
        let file: FileRecord = store::find_docs(self.store(), &self.doctype, &req)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| FsError::not_exist(&path))?;
        self.touch_file(&file);
        Ok(file)
    }

    /// Direct children of a directory, at most `limit` of them.
    pub async fn list_children(
        &self,
        folder_id: &str,
        limit: usize,
    ) -> FsResult<(Vec<DirRecord>, Vec<FileRecord>)> {
        let req = FindRequest::new(Selector::eq("folder_id", folder_id)).with_limit(limit);
        let docs = self.store.find(&self.doctype, &req).await?;

        let mut dirs = Vec::new();
        let mut files = Vec::new();
        for doc in docs {
            match AnyRecord::from_value(doc)? {
                AnyRecord::Dir(dir) if dir.id != folder_id => {
                    self.touch_dir(&dir);
                    dirs.push(dir);
                }
                AnyRecord::Dir(_) => {}
                AnyRecord::File(file) => {
                    self.touch_file(&file);
                    files.push(file);
                }
            }
        }
        Ok((dirs, files))
    }

    // ---- path derivation ----

    /// Absolute path of a directory, memoized on the record.
    ///
    /// Walks `folder_id` upward until a parent with a known path (or the
    /// root) is found. A missing parent, or a chain deeper than
    /// [`MAX_PATH_DEPTH`], yields `ParentMissing`.
    pub async fn derive_path(&self, dir: &mut DirRecord) -> FsResult<String> {
        if !dir.path.is_empty() {
            return Ok(dir.path.clone());
        }
        if dir.is_root() {
            dir.path = paths::ROOT.to_string();
            return Ok(dir.path.clone());
        }

        let mut names = vec![dir.name.clone()];
        let mut parent_id = dir.folder_id.clone();
        let base = loop {
            if parent_id.is_empty() || names.len() > MAX_PATH_DEPTH {
                return Err(FsError::parent_missing(parent_id));
            }
            let parent = match self.dir_by_id(&parent_id).await {
                Ok(parent) => parent,
                Err(FsError::NotExist(_)) => return Err(FsError::parent_missing(parent_id)),
                Err(e) => return Err(e),
            };
            if !parent.path.is_empty() {
                break parent.path;
            }
            if parent.is_root() {
                break paths::ROOT.to_string();
            }
            names.push(parent.name);
            parent_id = parent.folder_id;
        };

        let path = names
            .iter()
            .rev()
            .fold(base, |acc, name| paths::join(&acc, name));
        dir.path = path.clone();
        Ok(path)
    }

    /// Absolute path of a file: its parent's path joined with its name.
    pub async fn file_path(&self, file: &FileRecord) -> FsResult<String> {
        let mut parent = match self.dir_by_id(&file.folder_id).await {
            Ok(parent) => parent,
            Err(FsError::NotExist(_)) => return Err(FsError::parent_missing(&file.folder_id)),
            Err(e) => return Err(e),
        };
        let base = self.derive_path(&mut parent).await?;
        Ok(paths::join(&base, &file.name))
    }

    // ---- writes ----

    /// Persist a new directory, deriving its path first.
    pub async fn create_dir(&self, dir: &mut DirRecord) -> FsResult<()> {
        self.derive_path(dir).await?;
        create_doc(self.store(), &self.doctype, dir).await?;
        self.touch_dir(dir);
        Ok(())
    }

    /// Persist the root under its fixed id.
    pub async fn create_root(&self, root: &mut DirRecord) -> FsResult<()> {
        create_named_doc(self.store(), &self.doctype, root).await?;
        self.touch_dir(root);
        Ok(())
    }

    pub async fn create_file(&self, file: &mut FileRecord) -> FsResult<()> {
        create_doc(self.store(), &self.doctype, file).await?;
        self.touch_file(file);
        Ok(())
    }

    /// Persist changes to a directory; a failed write evicts the cached copy.
    pub async fn update_dir(&self, dir: &mut DirRecord) -> FsResult<()> {
        self.derive_path(dir).await?;
        if let Err(e) = update_doc(self.store(), &self.doctype, dir).await {
            self.dirs.lock().remove(&dir.id);
            return Err(e.into());
        }
        self.touch_dir(dir);
        Ok(())
    }

    pub async fn update_file(&self, file: &mut FileRecord) -> FsResult<()> {
        if let Err(e) = update_doc(self.store(), &self.doctype, file).await {
            self.files.lock().remove(&file.id);
            return Err(e.into());
        }
        self.touch_file(file);
        Ok(())
    }

    // ---- internals ----

    async fn fetch(&self, id: &str) -> FsResult<AnyRecord> {
        let value = self.store.get(&self.doctype, id).await?;
        AnyRecord::from_value(value)
    }

    /// Cache a copy without fetched children.
    fn touch_dir(&self, dir: &DirRecord) {
        let mut cached = dir.clone();
        cached.children = None;
        let evicted = self.dirs.lock().insert(cached);
        for old in evicted {
            debug!(id = %old.id, path = %old.path, "evicted dir");
        }
    }

    fn touch_file(&self, file: &FileRecord) {
        let evicted = self.files.lock().insert(file.clone());
        for old in evicted {
            debug!(id = %old.id, name = %old.name, "evicted file");
        }
    }
}

/// Unwrap a fetched record as the expected kind.
fn narrow<R: Record>(id: &str, any: AnyRecord) -> FsResult<R> {
    let found = any.kind();
    R::from_any(any).ok_or_else(|| wrong_type(id, R::KIND, found))
}

fn wrong_type(id: &str, expected: EntryKind, found: EntryKind) -> FsError {
    FsError::WrongType {
        id: id.to_string(),
        expected: kind_name(expected),
        found: kind_name(found),
    }
}

fn kind_name(kind: EntryKind) -> &'static str {
    match kind {
        EntryKind::Directory => "directory",
        EntryKind::File => "file",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::ROOT_DIR_ID;
    use crate::store::MemoryStore;
    use serde_json::json;

    fn cache_with(capacity: usize) -> (Arc<MemoryStore>, PathCache) {
        let store = Arc::new(MemoryStore::new());
        let config = VfsConfig::default().with_cache_capacity(capacity);
        let cache = PathCache::new(store.clone(), &config);
        (store, cache)
    }

    async fn seed_root(cache: &PathCache) -> DirRecord {
        let mut root = DirRecord::root();
        cache.create_root(&mut root).await.unwrap();
        root
    }

    #[tokio::test]
    async fn test_create_dir_derives_path_and_caches() {
        let (_store, cache) = cache_with(8);
        seed_root(&cache).await;

        let mut docs = DirRecord::new("docs", "", Vec::new()).unwrap();
        cache.create_dir(&mut docs).await.unwrap();
        assert_eq!(docs.path, "/docs");
        assert!(cache.contains_dir(&docs.id));

        let mut nested = DirRecord::new("notes", docs.id.clone(), Vec::new()).unwrap();
        cache.create_dir(&mut nested).await.unwrap();
        assert_eq!(nested.path, "/docs/notes");

        let found = cache.dir_by_path("/docs/./notes/").await.unwrap();
        assert_eq!(found.id, nested.id);
    }

    #[tokio::test]
    async fn test_dangling_parent_is_parent_missing() {
        let (store, cache) = cache_with(8);
        seed_root(&cache).await;

        let mut orphan = DirRecord::new("x", "no-such-dir", Vec::new()).unwrap();
        let err = cache.create_dir(&mut orphan).await.unwrap_err();
        assert!(matches!(err, FsError::ParentMissing(ref id) if id == "no-such-dir"));
        assert_eq!(store.count(cache.doctype()), 1);
    }

    #[tokio::test]
    async fn test_wrong_type() {
        let (_store, cache) = cache_with(8);
        seed_root(&cache).await;

        let mut file = FileRecord::new("a.txt", "", Vec::new()).unwrap();
        cache.create_file(&mut file).await.unwrap();

        let err = cache.dir_by_id(&file.id).await.unwrap_err();
        assert!(matches!(err, FsError::WrongType { expected: "directory", .. }));
        let err = cache.file_by_id(ROOT_DIR_ID).await.unwrap_err();
        assert!(matches!(err, FsError::WrongType { found: "directory", .. }));
    }

    #[tokio::test]
    async fn test_file_by_path_after_eviction() {
        let (_store, cache) = cache_with(1);
        seed_root(&cache).await;

        let mut a = FileRecord::new("a.txt", "", Vec::new()).unwrap();
        cache.create_file(&mut a).await.unwrap();
        let mut b = FileRecord::new("b.txt", "", Vec::new()).unwrap();
        cache.create_file(&mut b).await.unwrap();
        assert!(!cache.contains_file(&a.id));

        let found = cache.file_by_path("/a.txt").await.unwrap();
        assert_eq!(found.id, a.id);
        assert!(cache.contains_file(&a.id));
        assert!(!cache.contains_file(&b.id));

        assert!(matches!(
            cache.file_by_path("/missing").await.unwrap_err(),
            FsError::NotExist(_)
        ));
    }

    #[tokio::test]
    async fn test_failed_update_evicts() {
        let (_store, cache) = cache_with(8);
        seed_root(&cache).await;

        let mut dir = DirRecord::new("docs", "", Vec::new()).unwrap();
        cache.create_dir(&mut dir).await.unwrap();
        let mut stale = dir.clone();

        dir.tags = vec!["fresh".into()];
        cache.update_dir(&mut dir).await.unwrap();

        stale.tags = vec!["stale".into()];
        let err = cache.update_dir(&mut stale).await.unwrap_err();
        assert!(matches!(err, FsError::RevisionConflict(_)));
        assert!(!cache.contains_dir(&dir.id));

        let reloaded = cache.dir_by_id(&dir.id).await.unwrap();
        assert_eq!(reloaded.tags, vec!["fresh"]);
    }

    #[tokio::test]
    async fn test_late_stale_copy_does_not_shadow_rename() {
        let (_store, cache) = cache_with(8);
        seed_root(&cache).await;

        let mut dir = DirRecord::new("a", "", Vec::new()).unwrap();
        cache.create_dir(&mut dir).await.unwrap();
        let stale = dir.clone();

        dir.name = "z".into();
        dir.path = "/z".into();
        cache.update_dir(&mut dir).await.unwrap();

        // A reader that loaded the pre-rename copy caches it afterwards.
        cache.touch_dir(&stale);

        assert!(matches!(
            cache.dir_by_path("/a").await.unwrap_err(),
            FsError::NotExist(_)
        ));
        assert_eq!(cache.dir_by_path("/z").await.unwrap().rev, dir.rev);
        assert_eq!(cache.dir_by_id(&dir.id).await.unwrap().path, "/z");
    }

    #[tokio::test]
    async fn test_list_children_partitions() {
        let (store, cache) = cache_with(8);
        seed_root(&cache).await;

        let mut dir = DirRecord::new("docs", "", Vec::new()).unwrap();
        cache.create_dir(&mut dir).await.unwrap();
        let mut file = FileRecord::new("a.txt", "", Vec::new()).unwrap();
        cache.create_file(&mut file).await.unwrap();

        let (dirs, files) = cache.list_children(ROOT_DIR_ID, 100).await.unwrap();
        assert_eq!(dirs.len(), 1);
        assert_eq!(files.len(), 1);
        assert_eq!(dirs[0].id, dir.id);

        store
            .create(cache.doctype(), json!({"type": "socket", "folder_id": ROOT_DIR_ID}))
            .await
            .unwrap();
        assert!(cache.list_children(ROOT_DIR_ID, 100).await.is_err());
    }

    #[tokio::test]
    async fn test_cache_stays_bounded() {
        let (_store, cache) = cache_with(3);
        seed_root(&cache).await;
        for i in 0..10 {
            let mut dir = DirRecord::new(format!("d{i}"), "", Vec::new()).unwrap();
            cache.create_dir(&mut dir).await.unwrap();
        }
        assert_eq!(cache.len(), 3);
        // the root was evicted but is still reachable by path
        assert_eq!(cache.dir_by_path("/").await.unwrap().id, ROOT_DIR_ID);
    }
}
