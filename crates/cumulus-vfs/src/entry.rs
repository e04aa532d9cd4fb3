//! Directory and file records.
//!
//! Both kinds share one collection and are told apart by the `type`
//! discriminator. A directory persists its absolute `path` (derived from
//! its parent chain, then owned by the store); a file is addressed by
//! `(folder_id, name)` and its path is derived on demand.

use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::SystemTime;
use strum::{AsRefStr, Display, EnumString};

use crate::error::{FsError, FsResult};
use crate::paths;
use crate::store::{Doc, StoreError};

/// Id of the tenant's root directory.
pub const ROOT_DIR_ID: &str = "cumulus.files.root-dir";

/// Longest accepted leaf name, in bytes.
pub const MAX_NAME_LEN: usize = 255;

/// Record discriminator, persisted as `type`.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum EntryKind {
    Directory,
    File,
}

/// Behaviour shared by both record kinds.
pub trait Record: Doc + Clone + Sync + 'static {
    const KIND: EntryKind;

    fn name(&self) -> &str;
    fn folder_id(&self) -> &str;
    fn kind(&self) -> EntryKind;

    /// Take the record out of an [`AnyRecord`] of the matching kind.
    fn from_any(any: AnyRecord) -> Option<Self>;
}

/// Reject names that cannot be a single path segment.
pub fn validate_name(name: &str) -> FsResult<()> {
    if name.is_empty()
        || name == "."
        || name == ".."
        || name.contains(paths::SEPARATOR)
        || name.contains('\0')
        || name.len() > MAX_NAME_LEN
    {
        return Err(FsError::invalid_name(name));
    }
    Ok(())
}

/// De-duplicate tags, keeping first occurrences.
pub fn unique_tags(tags: impl IntoIterator<Item = String>) -> Vec<String> {
    tags.into_iter().collect::<IndexSet<_>>().into_iter().collect()
}

/// Direct children fetched for a directory. Never persisted.
#[derive(Debug, Clone, Default)]
pub struct Children {
    pub dirs: Vec<DirRecord>,
    pub files: Vec<FileRecord>,
}

/// A directory record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirRecord {
    #[serde(rename = "type")]
    kind: EntryKind,
    #[serde(rename = "_id", default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    #[serde(rename = "_rev", default, skip_serializing_if = "String::is_empty")]
    pub rev: String,
    pub name: String,
    /// Owning directory; empty for the root.
    #[serde(default)]
    pub folder_id: String,
    pub created_at: SystemTime,
    pub updated_at: SystemTime,
    /// Absolute path. Empty until derived.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub path: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(skip)]
    pub children: Option<Children>,
}

impl DirRecord {
    /// Build a new, unpersisted directory. An empty `folder_id` means the root.
    pub fn new(
        name: impl Into<String>,
        folder_id: impl Into<String>,
        tags: impl IntoIterator<Item = String>,
    ) -> FsResult<Self> {
        let name = name.into();
        validate_name(&name)?;

        let mut folder_id = folder_id.into();
        if folder_id.is_empty() {
            folder_id = ROOT_DIR_ID.to_string();
        }

        let now = SystemTime::now();
        Ok(Self {
            kind: EntryKind::Directory,
            id: String::new(),
            rev: String::new(),
            name,
            folder_id,
            created_at: now,
            updated_at: now,
            path: String::new(),
            tags: unique_tags(tags),
            children: None,
        })
    }

    /// The tenant root, at `/`.
    pub fn root() -> Self {
        let now = SystemTime::now();
        Self {
            kind: EntryKind::Directory,
            id: ROOT_DIR_ID.to_string(),
            rev: String::new(),
            name: String::new(),
            folder_id: String::new(),
            created_at: now,
            updated_at: now,
            path: paths::ROOT.to_string(),
            tags: Vec::new(),
            children: None,
        }
    }

    pub fn is_root(&self) -> bool {
        self.id == ROOT_DIR_ID
    }
}

impl Doc for DirRecord {
    fn id(&self) -> &str {
        &self.id
    }

    fn rev(&self) -> &str {
        &self.rev
    }

    fn set_id(&mut self, id: String) {
        self.id = id;
    }

    fn set_rev(&mut self, rev: String) {
        self.rev = rev;
    }
}

impl Record for DirRecord {
    const KIND: EntryKind = EntryKind::Directory;

    fn name(&self) -> &str {
        &self.name
    }

    fn folder_id(&self) -> &str {
        &self.folder_id
    }

    fn kind(&self) -> EntryKind {
        self.kind
    }

    fn from_any(any: AnyRecord) -> Option<Self> {
        any.into_dir()
    }
}

/// A file record. Content lives in the byte storage backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileRecord {
    #[serde(rename = "type")]
    kind: EntryKind,
    #[serde(rename = "_id", default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    #[serde(rename = "_rev", default, skip_serializing_if = "String::is_empty")]
    pub rev: String,
    pub name: String,
    pub folder_id: String,
    pub created_at: SystemTime,
    pub updated_at: SystemTime,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime: Option<String>,
    #[serde(default)]
    pub executable: bool,
}

impl FileRecord {
    /// Build a new, unpersisted file record. An empty `folder_id` means the root.
    pub fn new(
        name: impl Into<String>,
        folder_id: impl Into<String>,
        tags: impl IntoIterator<Item = String>,
    ) -> FsResult<Self> {
        let name = name.into();
        validate_name(&name)?;

        let mut folder_id = folder_id.into();
        if folder_id.is_empty() {
            folder_id = ROOT_DIR_ID.to_string();
        }

        let now = SystemTime::now();
        Ok(Self {
            kind: EntryKind::File,
            id: String::new(),
            rev: String::new(),
            name,
            folder_id,
            created_at: now,
            updated_at: now,
            tags: unique_tags(tags),
            size: 0,
            mime: None,
            executable: false,
        })
    }

    pub fn with_mime(mut self, mime: impl Into<String>) -> Self {
        self.mime = Some(mime.into());
        self
    }

    pub fn with_executable(mut self, executable: bool) -> Self {
        self.executable = executable;
        self
    }
}

impl Doc for FileRecord {
    fn id(&self) -> &str {
        &self.id
    }

    fn rev(&self) -> &str {
        &self.rev
    }

    fn set_id(&mut self, id: String) {
        self.id = id;
    }

    fn set_rev(&mut self, rev: String) {
        self.rev = rev;
    }
}

impl Record for FileRecord {
    const KIND: EntryKind = EntryKind::File;

    fn name(&self) -> &str {
        &self.name
    }

    fn folder_id(&self) -> &str {
        &self.folder_id
    }

    fn kind(&self) -> EntryKind {
        self.kind
    }

    fn from_any(any: AnyRecord) -> Option<Self> {
        any.into_file()
    }
}

/// A record of either kind, as returned by a lookup that only has an id.
#[derive(Debug, Clone)]
pub enum AnyRecord {
    Dir(DirRecord),
    File(FileRecord),
}

impl AnyRecord {
    /// Decode a raw store document, dispatching on its `type`.
    pub fn from_value(value: Value) -> FsResult<Self> {
        let kind = value
            .get("type")
            .and_then(Value::as_str)
            .and_then(|s| s.parse::<EntryKind>().ok())
            .ok_or_else(|| FsError::Store(StoreError::invalid("missing or unknown type")))?;

        let record = match kind {
            EntryKind::Directory => {
                AnyRecord::Dir(serde_json::from_value(value).map_err(StoreError::from)?)
            }
            EntryKind::File => {
                AnyRecord::File(serde_json::from_value(value).map_err(StoreError::from)?)
            }
        };
        Ok(record)
    }

    pub fn kind(&self) -> EntryKind {
        match self {
            AnyRecord::Dir(_) => EntryKind::Directory,
            AnyRecord::File(_) => EntryKind::File,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            AnyRecord::Dir(d) => &d.id,
            AnyRecord::File(f) => &f.id,
        }
    }

    pub fn into_dir(self) -> Option<DirRecord> {
        match self {
            AnyRecord::Dir(d) => Some(d),
            AnyRecord::File(_) => None,
        }
    }

    pub fn into_file(self) -> Option<FileRecord> {
        match self {
            AnyRecord::File(f) => Some(f),
            AnyRecord::Dir(_) => None,
        }
    }
}

/// Partial metadata change. `None` keeps the prior value, except
/// `updated_at`, which defaults to now.
#[derive(Debug, Clone, Default)]
pub struct DocPatch {
    pub name: Option<String>,
    pub folder_id: Option<String>,
    pub tags: Option<Vec<String>>,
    pub updated_at: Option<SystemTime>,
}

impl DocPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rename(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn move_to(mut self, folder_id: impl Into<String>) -> Self {
        self.folder_id = Some(folder_id.into());
        self
    }

    pub fn tags(mut self, tags: impl IntoIterator<Item = String>) -> Self {
        self.tags = Some(tags.into_iter().collect());
        self
    }

    pub fn updated_at(mut self, at: SystemTime) -> Self {
        self.updated_at = Some(at);
        self
    }

    /// True if applying the patch could change the record's path.
    pub fn moves(&self) -> bool {
        self.name.is_some() || self.folder_id.is_some()
    }

    /// Build the replacement for `old`: same id, rev, creation time and
    /// fetched children; path left empty for re-derivation.
    ///
    /// The root only takes tag and timestamp changes and keeps `/`.
    pub fn apply_to_dir(&self, old: &DirRecord) -> FsResult<DirRecord> {
        let updated_at = self.updated_at.unwrap_or_else(SystemTime::now);
        if updated_at < old.created_at {
            return Err(FsError::invalid_patch("updated_at is earlier than created_at"));
        }

        if old.is_root() {
            if self.moves() {
                return Err(FsError::ForbiddenMove {
                    from: paths::ROOT.to_string(),
                    to: self.name.clone().or_else(|| self.folder_id.clone()).unwrap_or_default(),
                });
            }
            let mut root = old.clone();
            root.tags = unique_tags(self.tags.clone().unwrap_or_else(|| old.tags.clone()));
            root.updated_at = updated_at;
            root.path = paths::ROOT.to_string();
            return Ok(root);
        }

        let mut new = DirRecord::new(
            self.name.clone().unwrap_or_else(|| old.name.clone()),
            self.folder_id.clone().unwrap_or_else(|| old.folder_id.clone()),
            self.tags.clone().unwrap_or_else(|| old.tags.clone()),
        )?;
        new.id = old.id.clone();
        new.rev = old.rev.clone();
        new.created_at = old.created_at;
        new.updated_at = updated_at;
        new.children = old.children.clone();
        Ok(new)
    }
}
