use super::{Record, StoreError};
use crate::model::ValidationError;
use chrono::{SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::{Map, Value};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info};
use uuid::Uuid;

/// Fields owned by the store; client-supplied values are discarded.
const MANAGED_FIELDS: [&str; 3] = ["_id", "createdAt", "updatedAt"];

/// JSON document store backed by SQLite.
///
/// # Schema
/// ```sql
/// CREATE TABLE documents (
///     seq        INTEGER PRIMARY KEY AUTOINCREMENT, -- insertion order
///     collection TEXT NOT NULL,
///     id         TEXT NOT NULL,
///     body       TEXT NOT NULL,                      -- JSON document
///     UNIQUE(collection, id)
/// );
/// ```
///
/// Every operation runs under the connection mutex, and read-modify-write
/// operations (update, delete) run inside a transaction, so each one is
/// atomic for its document.
pub struct DocumentStore {
    conn: Mutex<Connection>,
}

impl DocumentStore {
    /// Opens (or creates) the store.
    ///
    /// `url` is a filesystem path, optionally prefixed with `sqlite://`, or
    /// `:memory:` for a private in-memory database.
    pub fn open(url: &str) -> Result<Self, StoreError> {
        let path = url.strip_prefix("sqlite://").unwrap_or(url);
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS documents (
                seq        INTEGER PRIMARY KEY AUTOINCREMENT,
                collection TEXT NOT NULL,
                id         TEXT NOT NULL,
                body       TEXT NOT NULL,
                UNIQUE(collection, id)
            );
            CREATE INDEX IF NOT EXISTS idx_documents_collection ON documents(collection);",
        )?;

        info!(path = %path, "Document store opened");

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Unavailable("connection mutex poisoned".to_string()))
    }

    /// Inserts a new document built from `fields`.
    ///
    /// Assigns `_id` and both timestamps, then decodes and validates the
    /// result as `R` before writing it.
    pub fn insert<R: Record>(&self, mut fields: Map<String, Value>) -> Result<R, StoreError> {
        strip_managed(&mut fields);

        let now = timestamp();
        fields.insert("_id".to_string(), Value::String(Uuid::now_v7().to_string()));
        fields.insert("createdAt".to_string(), now.clone());
        fields.insert("updatedAt".to_string(), now);

        let record: R = decode(fields)?;
        let body = encode(&record)?;

        self.lock()?.execute(
            "INSERT INTO documents (collection, id, body) VALUES (?1, ?2, ?3)",
            params![R::COLLECTION.as_str(), record.id(), body],
        )?;

        debug!(collection = R::COLLECTION.as_str(), id = %record.id(), "Document inserted");
        Ok(record)
    }

    /// Returns the document with `id`, if any.
    pub fn find_by_id<R: Record>(&self, id: &str) -> Result<Option<R>, StoreError> {
        let conn = self.lock()?;
        let body: Option<String> = conn
            .query_row(
                "SELECT body FROM documents WHERE collection = ?1 AND id = ?2",
                params![R::COLLECTION.as_str(), id],
                |row| row.get(0),
            )
            .optional()?;

        body.map(|b| parse_stored(id, &b)).transpose()
    }

    /// Returns every document in the collection, oldest first.
    pub fn find_all<R: Record>(&self) -> Result<Vec<R>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, body FROM documents WHERE collection = ?1 ORDER BY seq ASC",
        )?;
        let rows = stmt.query_map(params![R::COLLECTION.as_str()], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut records = Vec::new();
        for row in rows {
            let (id, body) = row?;
            records.push(parse_stored(&id, &body)?);
        }
        Ok(records)
    }

    /// Returns documents whose top-level text `field` equals `value`, oldest first.
    pub fn find_where<R: Record>(&self, field: &str, value: &str) -> Result<Vec<R>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, body FROM documents
             WHERE collection = ?1 AND json_extract(body, ?2) = ?3
             ORDER BY seq ASC",
        )?;
        let path = format!("$.{}", field);
        let rows = stmt.query_map(params![R::COLLECTION.as_str(), path, value], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut records = Vec::new();
        for row in rows {
            let (id, body) = row?;
            records.push(parse_stored(&id, &body)?);
        }
        Ok(records)
    }

    /// Replaces the top-level fields present in `patch` and bumps `updatedAt`.
    ///
    /// Returns `Ok(None)` if no document has `id`. The merged document must
    /// still satisfy the schema; otherwise nothing is written.
    pub fn update_by_id<R: Record>(
        &self,
        id: &str,
        mut patch: Map<String, Value>,
    ) -> Result<Option<R>, StoreError> {
        strip_managed(&mut patch);

        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        let body: Option<String> = tx
            .query_row(
                "SELECT body FROM documents WHERE collection = ?1 AND id = ?2",
                params![R::COLLECTION.as_str(), id],
                |row| row.get(0),
            )
            .optional()?;
        let Some(body) = body else {
            return Ok(None);
        };

        let mut document: Map<String, Value> =
            serde_json::from_str(&body).map_err(|e| StoreError::Corrupt {
                id: id.to_string(),
                reason: e.to_string(),
            })?;
        document.extend(patch);
        document.insert("updatedAt".to_string(), timestamp());

        let record: R = decode(document)?;
        let body = encode(&record)?;

        tx.execute(
            "UPDATE documents SET body = ?3 WHERE collection = ?1 AND id = ?2",
            params![R::COLLECTION.as_str(), id, body],
        )?;
        tx.commit()?;

        debug!(collection = R::COLLECTION.as_str(), id = %id, "Document updated");
        Ok(Some(record))
    }

    /// Removes the document with `id`, returning it as it was before removal.
    pub fn delete_by_id<R: Record>(&self, id: &str) -> Result<Option<R>, StoreError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        let body: Option<String> = tx
            .query_row(
                "SELECT body FROM documents WHERE collection = ?1 AND id = ?2",
                params![R::COLLECTION.as_str(), id],
                |row| row.get(0),
            )
            .optional()?;
        let Some(body) = body else {
            return Ok(None);
        };
        let record: R = parse_stored(id, &body)?;

        tx.execute(
            "DELETE FROM documents WHERE collection = ?1 AND id = ?2",
            params![R::COLLECTION.as_str(), id],
        )?;
        tx.commit()?;

        debug!(collection = R::COLLECTION.as_str(), id = %id, "Document deleted");
        Ok(Some(record))
    }
}

fn strip_managed(fields: &mut Map<String, Value>) {
    for key in MANAGED_FIELDS {
        fields.remove(key);
    }
}

fn timestamp() -> Value {
    Value::String(Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true))
}

/// Schema enforcement: shape via serde, then the record's own rules.
fn decode<R: Record>(document: Map<String, Value>) -> Result<R, ValidationError> {
    let record: R = serde_json::from_value(Value::Object(document))?;
    record.validate()?;
    Ok(record)
}

fn encode<R: Record>(record: &R) -> Result<String, StoreError> {
    serde_json::to_string(record).map_err(|e| StoreError::Invalid(e.into()))
}

fn parse_stored<R: Record>(id: &str, body: &str) -> Result<R, StoreError> {
    serde_json::from_str(body).map_err(|e| StoreError::Corrupt {
        id: id.to_string(),
        reason: e.to_string(),
    })
}
