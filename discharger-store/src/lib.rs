pub mod access_keys;
pub mod blob_store;
pub mod documents;
pub mod error;
pub mod patients;
pub mod profiles;
pub mod snippets;
pub mod sqlite_audit;
pub mod sqlite_store;
pub mod summaries;

pub use blob_store::{BlobStore, LocalBlobStore};
pub use error::{Result, StoreError};
pub use sqlite_audit::{AuditEntry, AuditLog, Operation};
pub use sqlite_store::SqliteStore;
