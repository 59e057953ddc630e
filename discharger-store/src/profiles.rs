//! Clinician profile settings

use crate::error::Result;
use crate::sqlite_store::SqliteStore;
use discharger_core::UserProfile;
use rusqlite::{params, OptionalExtension};

#[allow(clippy::result_large_err)]
impl SqliteStore {
    pub fn get_profile(&self, user_id: &str) -> Result<Option<UserProfile>> {
        let conn = self.conn()?;
        let profile = conn
            .query_row(
                r#"
                SELECT user_id, display_name, specialty, institution, preferred_locale,
                       created_at, updated_at
                FROM user_profiles
                WHERE user_id = ?1
                "#,
                params![user_id],
                |row| {
                    Ok(UserProfile {
                        user_id: row.get(0)?,
                        display_name: row.get(1)?,
                        specialty: row.get(2)?,
                        institution: row.get(3)?,
                        preferred_locale: row.get(4)?,
                        created_at: row.get(5)?,
                        updated_at: row.get(6)?,
                    })
                },
            )
            .optional()?;
        Ok(profile)
    }

    /// Insert or replace; `created_at` of an existing row is kept
    pub fn upsert_profile(&self, profile: &UserProfile) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO user_profiles
            (user_id, display_name, specialty, institution, preferred_locale, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT(user_id) DO UPDATE SET
                display_name = excluded.display_name,
                specialty = excluded.specialty,
                institution = excluded.institution,
                preferred_locale = excluded.preferred_locale,
                updated_at = excluded.updated_at
            "#,
            params![
                profile.user_id,
                profile.display_name,
                profile.specialty,
                profile.institution,
                profile.preferred_locale,
                profile.created_at,
                profile.updated_at,
            ],
        )?;
        Ok(())
    }
}
