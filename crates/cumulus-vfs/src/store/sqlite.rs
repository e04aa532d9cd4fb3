//! SQLite-backed document store.
//!
//! Documents are stored as JSON text, one row per `(doctype, id)`.
//! Selectors compile to `json_extract` predicates; `path` and `folder_id`
//! carry expression indexes since the tree queries them on every miss.

use async_trait::async_trait;
use parking_lot::Mutex;
use rusqlite::types::Value as SqlValue;
use rusqlite::{Connection, OptionalExtension, params, params_from_iter};
use serde_json::Value;
use std::path::Path;

use super::{
    DocumentStore, FindRequest, Selector, StoreError, StoreResult, identity_of, new_doc_id,
    next_rev, stamp,
};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS documents (
    doctype TEXT NOT NULL,
    id TEXT NOT NULL,
    rev TEXT NOT NULL,
    body TEXT NOT NULL,
    PRIMARY KEY (doctype, id)
);
CREATE INDEX IF NOT EXISTS idx_documents_path
    ON documents(doctype, json_extract(body, '$.path'));
CREATE INDEX IF NOT EXISTS idx_documents_folder
    ON documents(doctype, json_extract(body, '$.folder_id'));
"#;

/// Document store persisted in a SQLite database.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore").field("conn", &"<locked>").finish()
    }
}

impl SqliteStore {
    /// Open or create a database at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> StoreResult<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory database (for testing).
    pub fn in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn exists(conn: &Connection, doctype: &str, id: &str) -> StoreResult<bool> {
        let found = conn
            .query_row(
                "SELECT 1 FROM documents WHERE doctype = ?1 AND id = ?2",
                params![doctype, id],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn insert(conn: &Connection, doctype: &str, id: &str, rev: &str, doc: &Value) -> StoreResult<()> {
        conn.execute(
            "INSERT INTO documents (doctype, id, rev, body) VALUES (?1, ?2, ?3, ?4)",
            params![doctype, id, rev, serde_json::to_string(doc)?],
        )?;
        Ok(())
    }
}

/// Field names are interpolated into JSON paths, so keep them to identifiers.
fn json_path(field: &str) -> StoreResult<String> {
    let valid = !field.is_empty()
        && field
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_');
    if !valid {
        return Err(StoreError::invalid(format!("unsupported selector field: {field}")));
    }
    Ok(format!("json_extract(body, '$.{field}')"))
}

/// Compile a selector into a SQL predicate, pushing its bound parameters.
fn compile(selector: &Selector, params: &mut Vec<SqlValue>) -> StoreResult<String> {
    match selector {
        Selector::Eq(field, value) => {
            let column = json_path(field)?;
            let bound = match value {
                Value::Null => return Ok(format!("{column} IS NULL")),
                Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
                Value::Number(n) => match n.as_i64() {
                    Some(i) => SqlValue::Integer(i),
                    None => SqlValue::Real(n.as_f64().unwrap_or_default()),
                },
                Value::String(s) => SqlValue::Text(s.clone()),
                other => {
                    return Err(StoreError::invalid(format!(
                        "cannot compare {field} against {other}"
                    )));
                }
            };
            params.push(bound);
            Ok(format!("{column} = ?"))
        }
        Selector::StartsWith(field, prefix) => {
            let column = json_path(field)?;
            params.push(SqlValue::Integer(prefix.chars().count() as i64));
            params.push(SqlValue::Text(prefix.clone()));
            Ok(format!("substr({column}, 1, ?) = ?"))
        }
        Selector::And(inner) if inner.is_empty() => Ok("1".to_string()),
        Selector::And(inner) => {
            let parts = inner
                .iter()
                .map(|s| compile(s, params).map(|sql| format!("({sql})")))
                .collect::<StoreResult<Vec<_>>>()?;
            Ok(parts.join(" AND "))
        }
    }
}

#[async_trait]
impl DocumentStore for SqliteStore {
    async fn get(&self, doctype: &str, id: &str) -> StoreResult<Value> {
        let conn = self.conn.lock();
        let body: Option<String> = conn
            .query_row(
                "SELECT body FROM documents WHERE doctype = ?1 AND id = ?2",
                params![doctype, id],
                |row| row.get(0),
            )
            .optional()?;
        match body {
            Some(body) => Ok(serde_json::from_str(&body)?),
            None => Err(StoreError::not_found(doctype, id)),
        }
    }

    async fn find(&self, doctype: &str, req: &FindRequest) -> StoreResult<Vec<Value>> {
        let mut bound = vec![SqlValue::Text(doctype.to_string())];
        let predicate = compile(&req.selector, &mut bound)?;
        let mut sql = format!(
            "SELECT body FROM documents WHERE doctype = ? AND ({predicate}) ORDER BY id"
        );
        if let Some(limit) = req.limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }

        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(bound.iter()), |row| row.get::<_, String>(0))?;

        let mut docs = Vec::new();
        for body in rows {
            docs.push(serde_json::from_str(&body?)?);
        }
        Ok(docs)
    }

    async fn create(&self, doctype: &str, doc: Value) -> StoreResult<(String, String)> {
        let id = new_doc_id();
        let rev = next_rev(None);
        let doc = stamp(doc, &id, &rev)?;

        let conn = self.conn.lock();
        Self::insert(&conn, doctype, &id, &rev, &doc)?;
        Ok((id, rev))
    }

    async fn create_named(&self, doctype: &str, id: &str, doc: Value) -> StoreResult<String> {
        let rev = next_rev(None);
        let doc = stamp(doc, id, &rev)?;

        let conn = self.conn.lock();
        if Self::exists(&conn, doctype, id)? {
            return Err(StoreError::conflict(doctype, id));
        }
        Self::insert(&conn, doctype, id, &rev, &doc)?;
        Ok(rev)
    }

    async fn update(&self, doctype: &str, doc: Value) -> StoreResult<String> {
        let (id, presented) = identity_of(&doc)?;
        let rev = next_rev(Some(&presented));
        let doc = stamp(doc, &id, &rev)?;

        let conn = self.conn.lock();
        let changed = conn.execute(
            "UPDATE documents SET rev = ?1, body = ?2
             WHERE doctype = ?3 AND id = ?4 AND rev = ?5",
            params![rev, serde_json::to_string(&doc)?, doctype, id, presented],
        )?;
        if changed == 0 {
            return if Self::exists(&conn, doctype, &id)? {
                Err(StoreError::conflict(doctype, &id))
            } else {
                Err(StoreError::not_found(doctype, &id))
            };
        }
        Ok(rev)
    }
}
