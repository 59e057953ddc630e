//! Patient records, scoped by owner

use crate::error::Result;
use crate::sqlite_store::{not_found, SqliteStore};
use discharger_core::Patient;
use rusqlite::{params, OptionalExtension, Row};

const COLUMNS: &str =
    "id, owner_id, name, date_of_birth, phone_number, mrn, created_at, updated_at";

fn patient_from_row(row: &Row<'_>) -> rusqlite::Result<Patient> {
    Ok(Patient {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        name: row.get(2)?,
        date_of_birth: row.get(3)?,
        phone_number: row.get(4)?,
        mrn: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

#[allow(clippy::result_large_err)]
impl SqliteStore {
    pub fn insert_patient(&self, patient: &Patient) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            &format!("INSERT INTO patients ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)", COLUMNS),
            params![
                patient.id,
                patient.owner_id,
                patient.name,
                patient.date_of_birth,
                patient.phone_number,
                patient.mrn,
                patient.created_at,
                patient.updated_at,
            ],
        )?;
        Ok(())
    }

    pub fn get_patient(&self, id: &str) -> Result<Option<Patient>> {
        let conn = self.conn()?;
        let patient = conn
            .query_row(
                &format!("SELECT {} FROM patients WHERE id = ?1", COLUMNS),
                params![id],
                patient_from_row,
            )
            .optional()?;
        Ok(patient)
    }

    /// Patients of one owner, newest first
    pub fn list_patients(&self, owner_id: &str) -> Result<Vec<Patient>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM patients WHERE owner_id = ?1 ORDER BY created_at DESC, id",
            COLUMNS
        ))?;
        let rows = stmt.query_map(params![owner_id], patient_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn update_patient(&self, patient: &Patient) -> Result<()> {
        let conn = self.conn()?;
        let changed = conn.execute(
            r#"
            UPDATE patients
            SET name = ?2, date_of_birth = ?3, phone_number = ?4, mrn = ?5, updated_at = ?6
            WHERE id = ?1
            "#,
            params![
                patient.id,
                patient.name,
                patient.date_of_birth,
                patient.phone_number,
                patient.mrn,
                patient.updated_at,
            ],
        )?;
        if changed == 0 {
            return Err(not_found("Patient", &patient.id));
        }
        Ok(())
    }

    /// Returns true if a row was removed
    pub fn delete_patient(&self, id: &str) -> Result<bool> {
        let conn = self.conn()?;
        let changed = conn.execute("DELETE FROM patients WHERE id = ?1", params![id])?;
        Ok(changed > 0)
    }
}
