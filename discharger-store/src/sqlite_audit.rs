//! SQLite-based audit log
//!
//! Separate file for easy management and rotation.

use crate::error::Result;
use rusqlite::{params, Connection};
use std::path::Path;

/// Operation type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Create,
    Read,
    Update,
    Delete,
    Generate,
    Translate,
    Share,
    PublicView,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Create => "create",
            Operation::Read => "read",
            Operation::Update => "update",
            Operation::Delete => "delete",
            Operation::Generate => "generate",
            Operation::Translate => "translate",
            Operation::Share => "share",
            Operation::PublicView => "public-view",
        }
    }
}

/// One row of the audit log
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditEntry {
    pub timestamp: String,
    pub operation: String,
    pub entity_type: Option<String>,
    pub entity_id: Option<String>,
    pub user_id: Option<String>,
    pub result: String,
    pub error_message: Option<String>,
}

/// Audit log
pub struct AuditLog {
    conn: Connection,
}

#[allow(clippy::result_large_err)]
impl AuditLog {
    /// Open the audit log (create if not exists)
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        let audit = Self { conn };
        audit.initialize()?;
        Ok(audit)
    }

    /// Initialize tables
    fn initialize(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS audit_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
                operation TEXT NOT NULL,
                entity_type TEXT,
                entity_id TEXT,
                user_id TEXT,
                client_ip TEXT,
                result TEXT NOT NULL,
                error_message TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_audit_timestamp ON audit_log(timestamp);
            CREATE INDEX IF NOT EXISTS idx_audit_entity ON audit_log(entity_type, entity_id);
            CREATE INDEX IF NOT EXISTS idx_audit_user ON audit_log(user_id);
            "#,
        )?;
        Ok(())
    }

    /// Record an audit log entry
    #[allow(clippy::too_many_arguments)]
    pub fn log(
        &self,
        operation: Operation,
        entity_type: Option<&str>,
        entity_id: Option<&str>,
        user_id: Option<&str>,
        client_ip: Option<&str>,
        success: bool,
        error_message: Option<&str>,
    ) -> Result<()> {
        let result = if success { "success" } else { "error" };

        self.conn.execute(
            r#"
            INSERT INTO audit_log
            (operation, entity_type, entity_id, user_id, client_ip, result, error_message)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
            params![
                operation.as_str(),
                entity_type,
                entity_id,
                user_id,
                client_ip,
                result,
                error_message,
            ],
        )?;

        Ok(())
    }

    /// Record a success log entry (helper)
    pub fn log_success(
        &self,
        operation: Operation,
        entity_type: &str,
        entity_id: &str,
        user_id: Option<&str>,
        client_ip: Option<&str>,
    ) -> Result<()> {
        self.log(
            operation,
            Some(entity_type),
            Some(entity_id),
            user_id,
            client_ip,
            true,
            None,
        )
    }

    /// Record an error log entry (helper)
    pub fn log_error(
        &self,
        operation: Operation,
        entity_type: Option<&str>,
        entity_id: Option<&str>,
        user_id: Option<&str>,
        client_ip: Option<&str>,
        error: &str,
    ) -> Result<()> {
        self.log(
            operation,
            entity_type,
            entity_id,
            user_id,
            client_ip,
            false,
            Some(error),
        )
    }

    /// Get recent audit log entries, newest first
    pub fn recent_entries(&self, limit: usize) -> Result<Vec<AuditEntry>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT timestamp, operation, entity_type, entity_id, user_id, result, error_message
            FROM audit_log
            ORDER BY id DESC
            LIMIT ?1
            "#,
        )?;

        let rows = stmt.query_map(params![limit as i64], |row| {
            Ok(AuditEntry {
                timestamp: row.get(0)?,
                operation: row.get(1)?,
                entity_type: row.get(2)?,
                entity_id: row.get(3)?,
                user_id: row.get(4)?,
                result: row.get(5)?,
                error_message: row.get(6)?,
            })
        })?;

        let mut entries = Vec::new();
        for row in rows {
            entries.push(row?);
        }

        Ok(entries)
    }
}
