//! Document store interface.
//!
//! The tree persists its records in a document database with per-document
//! optimistic versioning. Documents are JSON objects carrying `_id` and
//! `_rev`; every successful write bumps `_rev`, and an update presenting a
//! stale `_rev` is rejected with [`StoreError::Conflict`].
//!
//! - [`DocumentStore`] - the narrow async trait the tree consumes
//! - [`MemoryStore`] - in-process implementation (tests, ephemeral tenants)
//! - [`SqliteStore`] - SQLite-backed implementation
//! - [`Doc`] and the `*_doc` helpers - typed access on top of raw JSON

mod error;
mod memory;
mod selector;
mod sqlite;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use uuid::Uuid;

pub use error::{StoreError, StoreResult};
pub use memory::MemoryStore;
pub use selector::{FindRequest, Selector};
pub use sqlite::SqliteStore;

/// Field holding the document id.
pub const ID_FIELD: &str = "_id";
/// Field holding the document revision.
pub const REV_FIELD: &str = "_rev";

/// Async document database.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Fetch one document by id.
    async fn get(&self, doctype: &str, id: &str) -> StoreResult<Value>;

    /// Documents matching the request's selector, in id order, capped by its limit.
    async fn find(&self, doctype: &str, req: &FindRequest) -> StoreResult<Vec<Value>>;

    /// Insert a new document under a store-assigned id.
    ///
    /// Any `_id`/`_rev` on the input is ignored. Returns `(id, rev)`.
    async fn create(&self, doctype: &str, doc: Value) -> StoreResult<(String, String)>;

    /// Insert a new document under a caller-chosen id.
    ///
    /// Fails with `Conflict` if the id is taken. Returns the new rev.
    async fn create_named(&self, doctype: &str, id: &str, doc: Value) -> StoreResult<String>;

    /// Replace an existing document.
    ///
    /// The input's `_rev` must equal the stored one. Returns the new rev.
    async fn update(&self, doctype: &str, doc: Value) -> StoreResult<String>;
}

/// A typed document with identity and revision.
pub trait Doc: Serialize + DeserializeOwned + Send {
    fn id(&self) -> &str;
    fn rev(&self) -> &str;
    fn set_id(&mut self, id: String);
    fn set_rev(&mut self, rev: String);
}

pub async fn find_docs<T: Doc>(
    store: &dyn DocumentStore,
    doctype: &str,
    req: &FindRequest,
) -> StoreResult<Vec<T>> {
    store
        .find(doctype, req)
        .await?
        .into_iter()
        .map(|v| serde_json::from_value(v).map_err(StoreError::from))
        .collect()
}

/// Persist a new document, writing the assigned id and rev back into it.
pub async fn create_doc<T: Doc>(
    store: &dyn DocumentStore,
    doctype: &str,
    doc: &mut T,
) -> StoreResult<()> {
    let (id, rev) = store.create(doctype, serde_json::to_value(&*doc)?).await?;
    doc.set_id(id);
    doc.set_rev(rev);
    Ok(())
}

/// Persist a new document under its own, pre-set id.
pub async fn create_named_doc<T: Doc>(
    store: &dyn DocumentStore,
    doctype: &str,
    doc: &mut T,
) -> StoreResult<()> {
    if doc.id().is_empty() {
        return Err(StoreError::invalid("named document without an id"));
    }
    let id = doc.id().to_string();
    let rev = store
        .create_named(doctype, &id, serde_json::to_value(&*doc)?)
        .await?;
    doc.set_rev(rev);
    Ok(())
}

/// Persist changes to an existing document, writing the new rev back into it.
pub async fn update_doc<T: Doc>(
    store: &dyn DocumentStore,
    doctype: &str,
    doc: &mut T,
) -> StoreResult<()> {
    let rev = store.update(doctype, serde_json::to_value(&*doc)?).await?;
    doc.set_rev(rev);
    Ok(())
}

/// Fresh store-assigned document id.
pub(crate) fn new_doc_id() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Write count encoded in a revision token; 0 for an absent or foreign token.
pub fn rev_generation(rev: &str) -> u64 {
    rev.split_once('-')
        .and_then(|(g, _)| g.parse::<u64>().ok())
        .unwrap_or(0)
}

/// Next revision token: `"<generation>-<random>"`, generation counting writes.
pub(crate) fn next_rev(prev: Option<&str>) -> String {
    let generation = prev.map(rev_generation).unwrap_or(0);
    format!("{}-{}", generation + 1, Uuid::new_v4().simple())
}

/// Read `_id` and `_rev` off a document about to be updated.
pub(crate) fn identity_of(doc: &Value) -> StoreResult<(String, String)> {
    let field = |name: &str| {
        doc.get(name)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .ok_or_else(|| StoreError::invalid(format!("missing {name}")))
    };
    Ok((field(ID_FIELD)?, field(REV_FIELD)?))
}

/// Stamp identity fields onto a JSON object.
pub(crate) fn stamp(mut doc: Value, id: &str, rev: &str) -> StoreResult<Value> {
    let obj = doc
        .as_object_mut()
        .ok_or_else(|| StoreError::invalid("document is not a JSON object"))?;
    obj.insert(ID_FIELD.to_string(), Value::String(id.to_string()));
    obj.insert(REV_FIELD.to_string(), Value::String(rev.to_string()));
    Ok(doc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_next_rev_bumps_generation() {
        let first = next_rev(None);
        assert!(first.starts_with("1-"));
        let second = next_rev(Some(&first));
        assert!(second.starts_with("2-"));
        assert_ne!(next_rev(Some(&first)), second);
        assert_eq!(rev_generation(&second), 2);
        assert_eq!(rev_generation(""), 0);
        assert_eq!(rev_generation("x-1"), 0);
    }

    #[test]
    fn test_identity_of() {
        let doc = json!({"_id": "a", "_rev": "1-x"});
        assert_eq!(identity_of(&doc).unwrap(), ("a".into(), "1-x".into()));
        assert!(identity_of(&json!({"_id": "a"})).is_err());
        assert!(stamp(json!([1]), "a", "1-x").is_err());
    }
}
