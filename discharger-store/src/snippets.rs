//! Reusable text snippets

use crate::error::Result;
use crate::sqlite_store::{not_found, SqliteStore};
use discharger_core::Snippet;
use rusqlite::{params, OptionalExtension, Row};

fn snippet_from_row(row: &Row<'_>) -> rusqlite::Result<Snippet> {
    Ok(Snippet {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        title: row.get(2)?,
        content: row.get(3)?,
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
    })
}

#[allow(clippy::result_large_err)]
impl SqliteStore {
    pub fn insert_snippet(&self, snippet: &Snippet) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO snippets (id, owner_id, title, content, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                snippet.id,
                snippet.owner_id,
                snippet.title,
                snippet.content,
                snippet.created_at,
                snippet.updated_at,
            ],
        )?;
        Ok(())
    }

    pub fn get_snippet(&self, id: &str) -> Result<Option<Snippet>> {
        let conn = self.conn()?;
        let snippet = conn
            .query_row(
                "SELECT id, owner_id, title, content, created_at, updated_at FROM snippets WHERE id = ?1",
                params![id],
                snippet_from_row,
            )
            .optional()?;
        Ok(snippet)
    }

    /// Snippets of one owner, alphabetical by title
    pub fn list_snippets(&self, owner_id: &str) -> Result<Vec<Snippet>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT id, owner_id, title, content, created_at, updated_at
            FROM snippets
            WHERE owner_id = ?1
            ORDER BY title COLLATE NOCASE, id
            "#,
        )?;
        let rows = stmt.query_map(params![owner_id], snippet_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn update_snippet(&self, snippet: &Snippet) -> Result<()> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE snippets SET title = ?2, content = ?3, updated_at = ?4 WHERE id = ?1",
            params![snippet.id, snippet.title, snippet.content, snippet.updated_at],
        )?;
        if changed == 0 {
            return Err(not_found("Snippet", &snippet.id));
        }
        Ok(())
    }

    pub fn delete_snippet(&self, id: &str) -> Result<bool> {
        let conn = self.conn()?;
        let changed = conn.execute("DELETE FROM snippets WHERE id = ?1", params![id])?;
        Ok(changed > 0)
    }
}
