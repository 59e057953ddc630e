//! Share keys granting read access to a single summary

use crate::error::Result;
use crate::sqlite_store::{conflict_on_constraint, SqliteStore};
use discharger_core::{AccessRole, PatientAccessKey};
use rusqlite::{params, OptionalExtension, Row};

const COLUMNS: &str =
    "id, summary_id, phone_number, role, token, is_active, created_at, last_accessed_at";

fn access_key_from_row(row: &Row<'_>) -> rusqlite::Result<PatientAccessKey> {
    let role: String = row.get(3)?;
    let role = AccessRole::parse(&role).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            3,
            rusqlite::types::Type::Text,
            format!("unknown access role '{}'", role).into(),
        )
    })?;

    Ok(PatientAccessKey {
        id: row.get(0)?,
        summary_id: row.get(1)?,
        phone_number: row.get(2)?,
        role,
        token: row.get(4)?,
        is_active: row.get(5)?,
        created_at: row.get(6)?,
        last_accessed_at: row.get(7)?,
    })
}

#[allow(clippy::result_large_err)]
impl SqliteStore {
    pub fn insert_access_key(&self, key: &PatientAccessKey) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            &format!("INSERT INTO access_keys ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)", COLUMNS),
            params![
                key.id,
                key.summary_id,
                key.phone_number,
                key.role.as_str(),
                key.token,
                key.is_active,
                key.created_at,
                key.last_accessed_at,
            ],
        )
        .map_err(|e| conflict_on_constraint(e, "Access key token already in use"))?;
        Ok(())
    }

    pub fn get_access_key(&self, id: &str) -> Result<Option<PatientAccessKey>> {
        let conn = self.conn()?;
        let key = conn
            .query_row(
                &format!("SELECT {} FROM access_keys WHERE id = ?1", COLUMNS),
                params![id],
                access_key_from_row,
            )
            .optional()?;
        Ok(key)
    }

    /// Look up a key by its secret token, active or not
    pub fn get_access_key_by_token(&self, token: &str) -> Result<Option<PatientAccessKey>> {
        let conn = self.conn()?;
        let key = conn
            .query_row(
                &format!("SELECT {} FROM access_keys WHERE token = ?1", COLUMNS),
                params![token],
                access_key_from_row,
            )
            .optional()?;
        Ok(key)
    }

    pub fn list_access_keys(&self, summary_id: &str) -> Result<Vec<PatientAccessKey>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM access_keys WHERE summary_id = ?1 ORDER BY created_at, id",
            COLUMNS
        ))?;
        let rows = stmt.query_map(params![summary_id], access_key_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Returns false if the key does not exist
    pub fn deactivate_access_key(&self, id: &str) -> Result<bool> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE access_keys SET is_active = 0 WHERE id = ?1",
            params![id],
        )?;
        Ok(changed > 0)
    }

    pub fn touch_access_key(&self, id: &str, accessed_at: &str) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE access_keys SET last_accessed_at = ?2 WHERE id = ?1",
            params![id, accessed_at],
        )?;
        Ok(())
    }
}
