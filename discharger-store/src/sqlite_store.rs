//! SQLite-based entity storage
//!
//! One table per entity. Blocks are stored as JSON text. Translations are
//! unique per (summary_id, locale).

use crate::error::{Result, StoreError};
use rusqlite::{Connection, Row, Transaction};
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS patients (
    id TEXT PRIMARY KEY,
    owner_id TEXT NOT NULL,
    name TEXT NOT NULL,
    date_of_birth TEXT,
    phone_number TEXT,
    mrn TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_patients_owner ON patients(owner_id);

CREATE TABLE IF NOT EXISTS snippets (
    id TEXT PRIMARY KEY,
    owner_id TEXT NOT NULL,
    title TEXT NOT NULL,
    content TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_snippets_owner ON snippets(owner_id);

CREATE TABLE IF NOT EXISTS documents (
    id TEXT PRIMARY KEY,
    owner_id TEXT NOT NULL,
    file_name TEXT NOT NULL,
    content_type TEXT NOT NULL,
    size_bytes INTEGER NOT NULL,
    file_url TEXT NOT NULL,
    full_text TEXT,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_documents_owner ON documents(owner_id);

CREATE TABLE IF NOT EXISTS summaries (
    id TEXT PRIMARY KEY,
    owner_id TEXT NOT NULL,
    patient_id TEXT,
    title TEXT NOT NULL,
    blocks TEXT NOT NULL,
    discharge_text TEXT NOT NULL,
    document_ids TEXT NOT NULL,
    status TEXT NOT NULL,
    preferred_locale TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_summaries_owner ON summaries(owner_id);

CREATE TABLE IF NOT EXISTS summary_translations (
    summary_id TEXT NOT NULL,
    locale TEXT NOT NULL,
    source_locale TEXT NOT NULL,
    blocks TEXT NOT NULL,
    created_at TEXT NOT NULL,
    PRIMARY KEY (summary_id, locale)
);

CREATE TABLE IF NOT EXISTS access_keys (
    id TEXT PRIMARY KEY,
    summary_id TEXT NOT NULL,
    phone_number TEXT NOT NULL,
    role TEXT NOT NULL,
    token TEXT NOT NULL UNIQUE,
    is_active INTEGER NOT NULL,
    created_at TEXT NOT NULL,
    last_accessed_at TEXT
);
CREATE INDEX IF NOT EXISTS idx_access_keys_summary ON access_keys(summary_id);

CREATE TABLE IF NOT EXISTS user_profiles (
    user_id TEXT PRIMARY KEY,
    display_name TEXT,
    specialty TEXT,
    institution TEXT,
    preferred_locale TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
"#;

/// SQLite-based entity store
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

#[allow(clippy::result_large_err)]
impl SqliteStore {
    /// Open the store (create if not exists)
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path)?;

        // Enable WAL mode for read-write concurrency
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.execute_batch(SCHEMA)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub(crate) fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Other("SQLite connection mutex poisoned".to_string()))
    }

    /// Execute multiple operations atomically within an SQLite transaction
    pub fn in_transaction<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T>,
    {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let result = f(&tx)?;
        tx.commit()?;
        Ok(result)
    }
}

/// Read a JSON text column into a typed value
pub(crate) fn json_column<T: DeserializeOwned>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T> {
    let text: String = row.get(idx)?;
    serde_json::from_str(&text).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

/// Map a UNIQUE/PRIMARY KEY violation to a conflict
pub(crate) fn conflict_on_constraint(e: rusqlite::Error, message: impl Into<String>) -> StoreError {
    match e {
        rusqlite::Error::SqliteFailure(ref err, _)
            if err.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            StoreError::Conflict(message.into())
        }
        other => StoreError::Sqlite(other),
    }
}

pub(crate) fn not_found(entity: &str, id: &str) -> StoreError {
    StoreError::NotFound {
        entity: entity.to_string(),
        id: id.to_string(),
    }
}
