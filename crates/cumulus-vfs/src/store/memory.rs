//! In-process document store.

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};

use super::{
    DocumentStore, FindRequest, StoreError, StoreResult, identity_of, new_doc_id, next_rev, stamp,
    REV_FIELD,
};

/// Document store held in memory, one ordered map per doctype.
#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: RwLock<HashMap<String, BTreeMap<String, Value>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of documents of a doctype.
    pub fn count(&self, doctype: &str) -> usize {
        self.collections
            .read()
            .get(doctype)
            .map(BTreeMap::len)
            .unwrap_or(0)
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get(&self, doctype: &str, id: &str) -> StoreResult<Value> {
        self.collections
            .read()
            .get(doctype)
            .and_then(|docs| docs.get(id))
            .cloned()
            .ok_or_else(|| StoreError::not_found(doctype, id))
    }

    async fn find(&self, doctype: &str, req: &FindRequest) -> StoreResult<Vec<Value>> {
        let collections = self.collections.read();
        let Some(docs) = collections.get(doctype) else {
            return Ok(Vec::new());
        };
        Ok(docs
            .values()
            .filter(|doc| req.selector.matches(doc))
            .take(req.limit.unwrap_or(usize::MAX))
            .cloned()
            .collect())
    }

    async fn create(&self, doctype: &str, doc: Value) -> StoreResult<(String, String)> {
        let id = new_doc_id();
        let rev = next_rev(None);
        let doc = stamp(doc, &id, &rev)?;
        self.collections
            .write()
            .entry(doctype.to_string())
            .or_default()
            .insert(id.clone(), doc);
        Ok((id, rev))
    }

    async fn create_named(&self, doctype: &str, id: &str, doc: Value) -> StoreResult<String> {
        let rev = next_rev(None);
        let doc = stamp(doc, id, &rev)?;
        let mut collections = self.collections.write();
        let docs = collections.entry(doctype.to_string()).or_default();
        if docs.contains_key(id) {
            return Err(StoreError::conflict(doctype, id));
        }
        docs.insert(id.to_string(), doc);
        Ok(rev)
    }

    async fn update(&self, doctype: &str, doc: Value) -> StoreResult<String> {
        let (id, presented) = identity_of(&doc)?;
        let mut collections = self.collections.write();
        let current = collections
            .get_mut(doctype)
            .and_then(|docs| docs.get_mut(&id))
            .ok_or_else(|| StoreError::not_found(doctype, &id))?;

        if current.get(REV_FIELD).and_then(Value::as_str) != Some(presented.as_str()) {
            return Err(StoreError::conflict(doctype, &id));
        }

        let rev = next_rev(Some(&presented));
        *current = stamp(doc, &id, &rev)?;
        Ok(rev)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Selector;
    use serde_json::json;

    const DOCTYPE: &str = "test.docs";

    #[tokio::test]
    async fn test_create_get_update() {
        let store = MemoryStore::new();
        let (id, rev) = store
            .create(DOCTYPE, json!({"path": "/a", "_id": "ignored"}))
            .await
            .unwrap();
        assert_ne!(id, "ignored");

        let mut doc = store.get(DOCTYPE, &id).await.unwrap();
        assert_eq!(doc["_rev"], json!(rev));
        doc["path"] = json!("/b");

        let rev2 = store.update(DOCTYPE, doc).await.unwrap();
        assert!(rev2.starts_with("2-"));
        assert_eq!(store.get(DOCTYPE, &id).await.unwrap()["path"], json!("/b"));
    }

    #[tokio::test]
    async fn test_stale_rev_conflicts() {
        let store = MemoryStore::new();
        let (id, rev) = store.create(DOCTYPE, json!({"n": 1})).await.unwrap();

        store
            .update(DOCTYPE, json!({"_id": id, "_rev": rev, "n": 2}))
            .await
            .unwrap();
        let err = store
            .update(DOCTYPE, json!({"_id": id, "_rev": rev, "n": 3}))
            .await
            .unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn test_create_named_conflicts_on_reuse() {
        let store = MemoryStore::new();
        store.create_named(DOCTYPE, "root", json!({})).await.unwrap();
        let err = store.create_named(DOCTYPE, "root", json!({})).await.unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(store.count(DOCTYPE), 1);
    }

    #[tokio::test]
    async fn test_find_with_limit() {
        let store = MemoryStore::new();
        for p in ["/a", "/a/x", "/a/y", "/ab"] {
            store.create(DOCTYPE, json!({"path": p})).await.unwrap();
        }

        let all = store
            .find(DOCTYPE, &FindRequest::new(Selector::starts_with("path", "/a/")))
            .await
            .unwrap();
        assert_eq!(all.len(), 2);

        let one = store
            .find(
                DOCTYPE,
                &FindRequest::new(Selector::starts_with("path", "/a")).with_limit(1),
            )
            .await
            .unwrap();
        assert_eq!(one.len(), 1);

        assert!(store.get("other", "x").await.unwrap_err().is_not_found());
    }
}
