//! Uploaded document metadata. File bytes live in the blob store.

use crate::error::Result;
use crate::sqlite_store::SqliteStore;
use discharger_core::Document;
use rusqlite::{params, params_from_iter, OptionalExtension, Row};

const COLUMNS: &str =
    "id, owner_id, file_name, content_type, size_bytes, file_url, full_text, created_at";

fn document_from_row(row: &Row<'_>) -> rusqlite::Result<Document> {
    Ok(Document {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        file_name: row.get(2)?,
        content_type: row.get(3)?,
        size_bytes: row.get::<_, i64>(4)?.max(0) as u64,
        file_url: row.get(5)?,
        full_text: row.get(6)?,
        created_at: row.get(7)?,
    })
}

#[allow(clippy::result_large_err)]
impl SqliteStore {
    pub fn insert_document(&self, document: &Document) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            &format!("INSERT INTO documents ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)", COLUMNS),
            params![
                document.id,
                document.owner_id,
                document.file_name,
                document.content_type,
                document.size_bytes as i64,
                document.file_url,
                document.full_text,
                document.created_at,
            ],
        )?;
        Ok(())
    }

    pub fn get_document(&self, id: &str) -> Result<Option<Document>> {
        let conn = self.conn()?;
        let document = conn
            .query_row(
                &format!("SELECT {} FROM documents WHERE id = ?1", COLUMNS),
                params![id],
                document_from_row,
            )
            .optional()?;
        Ok(document)
    }

    /// Fetch several documents at once; unknown ids are skipped
    pub fn get_documents(&self, ids: &[String]) -> Result<Vec<Document>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders = (1..=ids.len())
            .map(|i| format!("?{}", i))
            .collect::<Vec<_>>()
            .join(", ");
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM documents WHERE id IN ({}) ORDER BY created_at, id",
            COLUMNS, placeholders
        ))?;
        let rows = stmt.query_map(params_from_iter(ids.iter()), document_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn list_documents(&self, owner_id: &str) -> Result<Vec<Document>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM documents WHERE owner_id = ?1 ORDER BY created_at DESC, id",
            COLUMNS
        ))?;
        let rows = stmt.query_map(params![owner_id], document_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn delete_document(&self, id: &str) -> Result<bool> {
        let conn = self.conn()?;
        let changed = conn.execute("DELETE FROM documents WHERE id = ?1", params![id])?;
        Ok(changed > 0)
    }
}
