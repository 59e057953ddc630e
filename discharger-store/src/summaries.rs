//! Summaries and their per-locale translations
//!
//! Replacing a summary's blocks invalidates every stored translation in the
//! same transaction. Deleting a summary also removes its translations and
//! deactivates its access keys.

use crate::error::{Result, StoreError};
use crate::sqlite_store::{conflict_on_constraint, json_column, not_found, SqliteStore};
use discharger_core::{Block, PatientSummary, SummaryStatus, SummaryTranslation};
use rusqlite::{params, Connection, OptionalExtension, Row};

const COLUMNS: &str = "id, owner_id, patient_id, title, blocks, discharge_text, document_ids, \
                       status, preferred_locale, created_at, updated_at";

fn summary_from_row(row: &Row<'_>) -> rusqlite::Result<PatientSummary> {
    let status: String = row.get(7)?;
    let status = SummaryStatus::parse(&status).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            7,
            rusqlite::types::Type::Text,
            format!("unknown summary status '{}'", status).into(),
        )
    })?;

    Ok(PatientSummary {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        patient_id: row.get(2)?,
        title: row.get(3)?,
        blocks: json_column(row, 4)?,
        discharge_text: row.get(5)?,
        document_ids: json_column(row, 6)?,
        status,
        preferred_locale: row.get(8)?,
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
    })
}

fn translation_from_row(row: &Row<'_>) -> rusqlite::Result<SummaryTranslation> {
    Ok(SummaryTranslation {
        summary_id: row.get(0)?,
        locale: row.get(1)?,
        source_locale: row.get(2)?,
        blocks: json_column(row, 3)?,
        created_at: row.get(4)?,
    })
}

fn delete_translations_in(conn: &Connection, summary_id: &str) -> Result<usize> {
    Ok(conn.execute(
        "DELETE FROM summary_translations WHERE summary_id = ?1",
        params![summary_id],
    )?)
}

fn insert_translation_in(conn: &Connection, translation: &SummaryTranslation) -> Result<()> {
    let blocks = serde_json::to_string(&translation.blocks)?;
    conn.execute(
        r#"
        INSERT INTO summary_translations (summary_id, locale, source_locale, blocks, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5)
        "#,
        params![
            translation.summary_id,
            translation.locale,
            translation.source_locale,
            blocks,
            translation.created_at,
        ],
    )
    .map_err(|e| {
        conflict_on_constraint(
            e,
            format!(
                "Translation to '{}' already exists for summary {}",
                translation.locale, translation.summary_id
            ),
        )
    })?;
    Ok(())
}

#[allow(clippy::result_large_err)]
impl SqliteStore {
    pub fn insert_summary(&self, summary: &PatientSummary) -> Result<()> {
        let blocks = serde_json::to_string(&summary.blocks)?;
        let document_ids = serde_json::to_string(&summary.document_ids)?;

        let conn = self.conn()?;
        conn.execute(
            &format!(
                "INSERT INTO summaries ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                COLUMNS
            ),
            params![
                summary.id,
                summary.owner_id,
                summary.patient_id,
                summary.title,
                blocks,
                summary.discharge_text,
                document_ids,
                summary.status.as_str(),
                summary.preferred_locale,
                summary.created_at,
                summary.updated_at,
            ],
        )?;
        Ok(())
    }

    pub fn get_summary(&self, id: &str) -> Result<Option<PatientSummary>> {
        let conn = self.conn()?;
        let summary = conn
            .query_row(
                &format!("SELECT {} FROM summaries WHERE id = ?1", COLUMNS),
                params![id],
                summary_from_row,
            )
            .optional()?;
        Ok(summary)
    }

    /// Summaries of one owner, most recently updated first
    pub fn list_summaries(
        &self,
        owner_id: &str,
        status: Option<SummaryStatus>,
    ) -> Result<Vec<PatientSummary>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            r#"
            SELECT {} FROM summaries
            WHERE owner_id = ?1 AND (?2 IS NULL OR status = ?2)
            ORDER BY updated_at DESC, id
            "#,
            COLUMNS
        ))?;
        let rows = stmt.query_map(
            params![owner_id, status.map(|s| s.as_str())],
            summary_from_row,
        )?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Update everything except blocks and status
    pub fn update_summary_details(&self, summary: &PatientSummary) -> Result<()> {
        let document_ids = serde_json::to_string(&summary.document_ids)?;
        let conn = self.conn()?;
        let changed = conn.execute(
            r#"
            UPDATE summaries
            SET patient_id = ?2, title = ?3, discharge_text = ?4, document_ids = ?5,
                preferred_locale = ?6, updated_at = ?7
            WHERE id = ?1
            "#,
            params![
                summary.id,
                summary.patient_id,
                summary.title,
                summary.discharge_text,
                document_ids,
                summary.preferred_locale,
                summary.updated_at,
            ],
        )?;
        if changed == 0 {
            return Err(not_found("PatientSummary", &summary.id));
        }
        Ok(())
    }

    pub fn update_summary_status(
        &self,
        id: &str,
        status: SummaryStatus,
        updated_at: &str,
    ) -> Result<()> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE summaries SET status = ?2, updated_at = ?3 WHERE id = ?1",
            params![id, status.as_str(), updated_at],
        )?;
        if changed == 0 {
            return Err(not_found("PatientSummary", id));
        }
        Ok(())
    }

    /// Store new blocks and drop the now stale translations.
    ///
    /// Returns the number of translations removed.
    pub fn replace_blocks(&self, id: &str, blocks: &[Block], updated_at: &str) -> Result<usize> {
        let blocks = serde_json::to_string(blocks)?;
        self.in_transaction(|tx| {
            let changed = tx.execute(
                "UPDATE summaries SET blocks = ?2, updated_at = ?3 WHERE id = ?1",
                params![id, blocks, updated_at],
            )?;
            if changed == 0 {
                return Err(not_found("PatientSummary", id));
            }
            delete_translations_in(tx, id)
        })
    }

    /// Returns false if the summary did not exist
    pub fn delete_summary(&self, id: &str) -> Result<bool> {
        self.in_transaction(|tx| {
            delete_translations_in(tx, id)?;
            tx.execute(
                "UPDATE access_keys SET is_active = 0 WHERE summary_id = ?1",
                params![id],
            )?;
            let changed = tx.execute("DELETE FROM summaries WHERE id = ?1", params![id])?;
            Ok(changed > 0)
        })
    }

    /// Insert a translation made from `source_blocks`, but only while the
    /// summary still holds exactly those blocks.
    ///
    /// A block edit that landed after the blocks were read is a conflict, as is
    /// an existing translation for the same locale.
    pub fn insert_translation_of(
        &self,
        translation: &SummaryTranslation,
        source_blocks: &[Block],
    ) -> Result<()> {
        self.in_transaction(|tx| {
            let current: Option<Vec<Block>> = tx
                .query_row(
                    "SELECT blocks FROM summaries WHERE id = ?1",
                    params![translation.summary_id],
                    |row| json_column(row, 0),
                )
                .optional()?;
            match current {
                None => Err(not_found("PatientSummary", &translation.summary_id)),
                Some(blocks) if blocks.as_slice() != source_blocks => {
                    Err(StoreError::Conflict(format!(
                        "Blocks of summary {} changed during translation",
                        translation.summary_id
                    )))
                }
                Some(_) => insert_translation_in(tx, translation),
            }
        })
    }

    pub fn get_translation(
        &self,
        summary_id: &str,
        locale: &str,
    ) -> Result<Option<SummaryTranslation>> {
        let conn = self.conn()?;
        let translation = conn
            .query_row(
                r#"
                SELECT summary_id, locale, source_locale, blocks, created_at
                FROM summary_translations
                WHERE summary_id = ?1 AND locale = ?2
                "#,
                params![summary_id, locale],
                translation_from_row,
            )
            .optional()?;
        Ok(translation)
    }

    pub fn list_translations(&self, summary_id: &str) -> Result<Vec<SummaryTranslation>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT summary_id, locale, source_locale, blocks, created_at
            FROM summary_translations
            WHERE summary_id = ?1
            ORDER BY locale
            "#,
        )?;
        let rows = stmt.query_map(params![summary_id], translation_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn delete_translation(&self, summary_id: &str, locale: &str) -> Result<bool> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "DELETE FROM summary_translations WHERE summary_id = ?1 AND locale = ?2",
            params![summary_id, locale],
        )?;
        Ok(changed > 0)
    }
}
