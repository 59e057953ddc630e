//! Document uploads. Bytes go to the blob store, metadata to SQLite.

use axum::{
    extract::{Multipart, Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
};
use discharger_core::model::FILES_PATH_SEGMENT;
use discharger_core::Document;
use discharger_store::Operation;
use std::sync::Arc;

use super::{internal, invalid, new_id, not_found, now, owned, store_error, HandlerResult};
use crate::audit::{self, AuditContext};
use crate::auth::AuthUser;
use crate::AppState;

const MAX_SEGMENT_LEN: usize = 100;

/// Make `raw` usable as one blob key segment
pub fn key_segment(raw: &str, fallback: &str) -> String {
    let cleaned: String = raw
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.replace("..", "");
    let cleaned: String = cleaned.chars().take(MAX_SEGMENT_LEN).collect();

    if cleaned.is_empty() || cleaned == "." {
        fallback.to_string()
    } else {
        cleaned
    }
}

/// `documents/{owner}/{document id}/{file name}`
pub fn document_key(owner_id: &str, document_id: &str, file_name: &str) -> String {
    format!(
        "documents/{}/{}/{}",
        key_segment(owner_id, "owner"),
        document_id,
        key_segment(file_name, "file")
    )
}

/// Text is only extracted from plain-text uploads
fn extract_text(content_type: &str, bytes: &[u8]) -> Option<String> {
    content_type
        .starts_with("text/")
        .then(|| String::from_utf8_lossy(bytes).into_owned())
        .filter(|text| !text.trim().is_empty())
}

/// Undo earlier files of a failed upload request. Best effort.
fn rollback(state: &AppState, stored: &[Document]) {
    for document in stored {
        if let Err(e) = state.store.delete_document(&document.id) {
            tracing::error!(document_id = %document.id, error = %e, "Rollback: failed to delete document row");
        }
        if let Some(key) = document.blob_key()
            && let Err(e) = state.blobs.delete(key)
        {
            tracing::error!(document_id = %document.id, error = %e, "Rollback: failed to delete blob");
        }
    }
    if !stored.is_empty() {
        tracing::warn!(count = stored.len(), "Rolled back partially uploaded documents");
    }
}

/// POST /api/documents (multipart, one or more `file` fields)
pub async fn upload_documents(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    audit_ctx: AuditContext,
    mut multipart: Multipart,
) -> HandlerResult<(StatusCode, Json<Vec<Document>>)> {
    let mut stored: Vec<Document> = Vec::new();

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => {
                rollback(&state, &stored);
                return Err(invalid(format!("Malformed multipart body: {}", e)));
            }
        };

        if field.name() != Some("file") {
            continue;
        }

        let file_name = field.file_name().unwrap_or("document").to_string();
        let content_type = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();

        let bytes = match field.bytes().await {
            Ok(bytes) => bytes,
            Err(e) => {
                rollback(&state, &stored);
                return Err(invalid(format!("Failed to read file '{}': {}", file_name, e)));
            }
        };

        let id = new_id();
        let key = document_key(&user.user_id, &id, &file_name);

        if let Err(e) = state.blobs.put(&key, &bytes) {
            rollback(&state, &stored);
            return Err(internal("Failed to store document", e));
        }

        let document = Document {
            id,
            owner_id: user.user_id.clone(),
            file_name,
            content_type: content_type.clone(),
            size_bytes: bytes.len() as u64,
            file_url: format!(
                "{}{}{}",
                state.config.public_base_url(),
                FILES_PATH_SEGMENT,
                key
            ),
            full_text: extract_text(&content_type, &bytes),
            created_at: now(),
        };

        if let Err(e) = state.store.insert_document(&document) {
            if let Err(blob_err) = state.blobs.delete(&key) {
                tracing::error!(key = %key, error = %blob_err, "Failed to delete orphaned blob");
            }
            rollback(&state, &stored);
            return Err(internal("Failed to store document", e));
        }

        tracing::info!(
            document_id = %document.id,
            size = document.size_bytes,
            has_text = document.full_text.is_some(),
            "Stored document"
        );
        stored.push(document);
    }

    if stored.is_empty() {
        return Err(invalid("No file provided"));
    }

    for document in &stored {
        audit::log_operation_success(&audit_ctx, Operation::Create, "Document", &document.id, &state.audit);
    }
    Ok((StatusCode::CREATED, Json(stored)))
}

/// GET /api/documents
pub async fn list_documents(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> HandlerResult<Json<Vec<Document>>> {
    Ok(Json(state.store.list_documents(&user.user_id).map_err(store_error)?))
}

/// GET /api/documents/{id}
pub async fn get_document(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<String>,
) -> HandlerResult<Json<Document>> {
    Ok(Json(owned(state.store.get_document(&id), &user, &id)?))
}

/// DELETE /api/documents/{id}
///
/// The blob goes first when its key can be derived from `fileUrl`; a blob
/// failure is logged and does not keep the row alive.
pub async fn delete_document(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    audit_ctx: AuditContext,
    Path(id): Path<String>,
) -> HandlerResult<StatusCode> {
    let document = owned(state.store.get_document(&id), &user, &id)?;

    match document.blob_key() {
        Some(key) => match state.blobs.delete(key) {
            Ok(true) => {}
            Ok(false) => tracing::warn!(document_id = %id, key = %key, "Blob already missing"),
            Err(e) => tracing::error!(document_id = %id, error = %e, "Failed to delete blob"),
        },
        None => tracing::warn!(document_id = %id, file_url = %document.file_url, "Blob key not derivable"),
    }

    state.store.delete_document(&id).map_err(store_error)?;

    audit::log_operation_success(&audit_ctx, Operation::Delete, "Document", &id, &state.audit);
    Ok(StatusCode::NO_CONTENT)
}

/// GET /files/{*key}
pub async fn serve_file(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(key): Path<String>,
) -> HandlerResult<Response> {
    let document_id = match key.split('/').collect::<Vec<_>>().as_slice() {
        ["documents", _, id, _] => id.to_string(),
        _ => return Err(not_found("File", &key)),
    };

    let document = owned(state.store.get_document(&document_id), &user, &document_id)?;
    if document.blob_key() != Some(key.as_str()) {
        return Err(not_found("File", &key));
    }

    let bytes = state
        .blobs
        .get(&key)
        .map_err(|e| internal("Failed to read document", e))?
        .ok_or_else(|| not_found("File", &key))?;

    let disposition = format!(
        "inline; filename=\"{}\"",
        key_segment(&document.file_name, "file")
    );
    Ok((
        [
            (header::CONTENT_TYPE, document.content_type),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        bytes,
    )
        .into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::DEV_USER_ID;
    use crate::handlers::testing::{empty_request, router, send};
    use axum::body::Body;
    use axum::http::Request;
    use discharger_core::MockLlmClient;
    use discharger_store::{BlobStore, LocalBlobStore, StoreError};
    use serde_json::json;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const BOUNDARY: &str = "discharger-test-boundary";

    /// Local blobs that fail after `max_puts` writes, and on every delete if asked
    struct FlakyBlobs {
        inner: LocalBlobStore,
        max_puts: usize,
        fail_deletes: bool,
        puts: AtomicUsize,
        written: Mutex<Vec<String>>,
    }

    impl FlakyBlobs {
        fn new(dir: &tempfile::TempDir, max_puts: usize, fail_deletes: bool) -> Arc<Self> {
            Arc::new(Self {
                inner: LocalBlobStore::open(dir.path().join("flaky-blobs")).unwrap(),
                max_puts,
                fail_deletes,
                puts: AtomicUsize::new(0),
                written: Mutex::new(Vec::new()),
            })
        }
    }

    impl BlobStore for FlakyBlobs {
        fn put(&self, key: &str, bytes: &[u8]) -> discharger_store::Result<()> {
            if self.puts.fetch_add(1, Ordering::SeqCst) >= self.max_puts {
                return Err(StoreError::Other("disk full".to_string()));
            }
            self.inner.put(key, bytes)?;
            self.written.lock().unwrap().push(key.to_string());
            Ok(())
        }

        fn get(&self, key: &str) -> discharger_store::Result<Option<Vec<u8>>> {
            self.inner.get(key)
        }

        fn delete(&self, key: &str) -> discharger_store::Result<bool> {
            if self.fail_deletes {
                return Err(StoreError::Other("permission denied".to_string()));
            }
            self.inner.delete(key)
        }
    }

    fn upload_request(files: &[(&str, &str)]) -> Request<Body> {
        let mut body = String::new();
        for (name, content) in files {
            body.push_str(&format!(
                "--{}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{}\"\r\nContent-Type: text/plain\r\n\r\n{}\r\n",
                BOUNDARY, name, content
            ));
        }
        body.push_str(&format!("--{}--\r\n", BOUNDARY));
        Request::post("/api/documents")
            .header(
                "content-type",
                format!("multipart/form-data; boundary={}", BOUNDARY),
            )
            .body(Body::from(body))
            .unwrap()
    }

    fn mock_llm() -> Arc<MockLlmClient> {
        Arc::new(MockLlmClient::new(json!({ "blocks": [] })))
    }

    #[tokio::test]
    async fn test_delete_survives_blob_failure() {
        let dir = tempfile::tempdir().unwrap();
        let blobs = FlakyBlobs::new(&dir, usize::MAX, true);
        let app = router(&dir, mock_llm(), Some(blobs.clone()));

        let (status, body) = send(&app, upload_request(&[("labs.txt", "INR 1.1")])).await;
        assert_eq!(status, StatusCode::CREATED);
        let id = body[0]["id"].as_str().unwrap().to_string();

        let (status, _) = send(&app, empty_request("DELETE", &format!("/api/documents/{}", id))).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, _) = send(&app, empty_request("GET", &format!("/api/documents/{}", id))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        // The blob itself is left behind
        let key = blobs.written.lock().unwrap()[0].clone();
        assert!(blobs.get(&key).unwrap().is_some());
    }

    #[tokio::test]
    async fn test_failed_upload_rolls_back_earlier_files() {
        let dir = tempfile::tempdir().unwrap();
        let blobs = FlakyBlobs::new(&dir, 1, false);
        let app = router(&dir, mock_llm(), Some(blobs.clone()));

        let (status, body) = send(
            &app,
            upload_request(&[("first.txt", "INR 1.1"), ("second.txt", "Hb 12.0")]),
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!body["message"].as_str().unwrap().contains("disk full"));

        let (status, body) = send(&app, empty_request("GET", "/api/documents")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!([]));

        let written = blobs.written.lock().unwrap().clone();
        assert_eq!(written.len(), 1);
        assert!(written[0].starts_with(&format!("documents/{}/", DEV_USER_ID)));
        assert!(blobs.get(&written[0]).unwrap().is_none());
    }

    #[test]
    fn test_key_segment() {
        assert_eq!(key_segment("discharge letter (1).pdf", "file"), "discharge_letter__1_.pdf");
        assert_eq!(key_segment("../../etc/passwd", "file"), "__etc_passwd");
        assert_eq!(key_segment("auth0|12345", "owner"), "auth0_12345");
        assert_eq!(key_segment("", "file"), "file");
        assert_eq!(key_segment("..", "file"), "file");
        assert_eq!(key_segment(&"a".repeat(300), "file").len(), MAX_SEGMENT_LEN);
    }

    #[test]
    fn test_document_key_is_valid_blob_key() {
        let key = document_key("auth0|u1", "d-1", "Résumé médical.txt");
        assert!(key.starts_with("documents/auth0_u1/d-1/"));
        assert!(discharger_store::blob_store::validate_key(&key).is_ok());
    }

    #[test]
    fn test_extract_text_only_for_text_types() {
        assert_eq!(extract_text("text/plain", b"INR 1.1").as_deref(), Some("INR 1.1"));
        assert_eq!(extract_text("application/pdf", b"%PDF-1.7"), None);
        assert_eq!(extract_text("text/plain", b"   "), None);
    }
}
