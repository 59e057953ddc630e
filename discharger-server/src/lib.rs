//! discharger - discharge instructions service
//!
//! Turns discharge notes into structured, translatable patient-facing blocks
//! and shares them with patients through access keys.

pub mod audit;
pub mod auth;
pub mod config;
pub mod handlers;
pub mod llm;
pub mod share;
pub mod sms;
pub mod tls;

use axum::{
    extract::DefaultBodyLimit,
    http::Method,
    routing::{get, post, put},
    Router,
};
use discharger_core::LlmClient;
use discharger_store::{AuditLog, BlobStore, LocalBlobStore, SqliteStore, StoreError};
use std::sync::Arc;
use tokio::sync::Mutex;
use tower_http::{
    cors::{Any, CorsLayer},
    limit::RequestBodyLimitLayer,
    trace::TraceLayer,
};

/// Application state
pub struct AppState {
    pub store: SqliteStore,
    pub blobs: Arc<dyn BlobStore>,
    pub audit: Arc<Mutex<AuditLog>>,
    pub config: config::ServerConfig,
    pub llm: Arc<dyn LlmClient>,
    pub sms: Arc<dyn sms::SmsSender>,
    pub jwk_cache: tokio::sync::RwLock<auth::JwkCache>,
}

impl AppState {
    pub fn new(
        store: SqliteStore,
        blobs: Arc<dyn BlobStore>,
        audit: AuditLog,
        config: config::ServerConfig,
        llm: Arc<dyn LlmClient>,
        sms: Arc<dyn sms::SmsSender>,
    ) -> Self {
        Self {
            store,
            blobs,
            audit: Arc::new(Mutex::new(audit)),
            config,
            llm,
            sms,
            jwk_cache: tokio::sync::RwLock::new(auth::JwkCache::new()),
        }
    }

    /// Open the database, audit log and blob directory under `storage.data_dir`
    pub fn open(
        config: config::ServerConfig,
        llm: Arc<dyn LlmClient>,
        sms: Arc<dyn sms::SmsSender>,
    ) -> Result<Self, StoreError> {
        std::fs::create_dir_all(&config.storage.data_dir)?;

        let store = SqliteStore::open(config.database_path())?;
        let audit = AuditLog::open(config.audit_db_path())?;
        let blobs = LocalBlobStore::open(config.blob_dir_path())?;

        tracing::info!(data_dir = %config.storage.data_dir.display(), "Opened storage");
        Ok(Self::new(store, Arc::new(blobs), audit, config, llm, sms))
    }
}

/// Build the application router with all routes and middleware
pub fn build_router(state: Arc<AppState>) -> Router {
    use handlers::{
        access_keys, citations, documents, generate, health, patients, profile, public, snippets,
        summaries, translations,
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers(Any);

    let max_body = state.config.server.max_body_bytes;

    Router::new()
        // Unauthenticated
        .route("/health", get(health::health_check))
        .route("/public/summary", get(public::public_summary))
        // Stored files, owner only
        .route("/files/{*key}", get(documents::serve_file))
        // Patients and snippets
        .route("/api/patients", get(patients::list_patients).post(patients::create_patient))
        .route(
            "/api/patients/{id}",
            get(patients::get_patient)
                .put(patients::update_patient)
                .delete(patients::delete_patient),
        )
        .route("/api/snippets", get(snippets::list_snippets).post(snippets::create_snippet))
        .route(
            "/api/snippets/{id}",
            get(snippets::get_snippet)
                .put(snippets::update_snippet)
                .delete(snippets::delete_snippet),
        )
        // Documents
        .route(
            "/api/documents",
            get(documents::list_documents).post(documents::upload_documents),
        )
        .route(
            "/api/documents/{id}",
            get(documents::get_document).delete(documents::delete_document),
        )
        // Generation
        .route("/api/generate", post(generate::generate))
        // Summaries
        .route(
            "/api/summaries",
            get(summaries::list_summaries).post(summaries::create_summary),
        )
        .route(
            "/api/summaries/{id}",
            get(summaries::get_summary)
                .put(summaries::update_summary)
                .delete(summaries::delete_summary),
        )
        .route("/api/summaries/{id}/blocks", put(summaries::replace_blocks))
        .route("/api/summaries/{id}/regenerate", post(summaries::regenerate))
        .route("/api/summaries/{id}/status", put(summaries::change_status))
        .route("/api/summaries/{id}/citations", post(citations::highlight_citation))
        // Translations
        .route(
            "/api/summaries/{id}/translations",
            get(translations::list_translations).post(translations::create_translation),
        )
        .route(
            "/api/summaries/{id}/translations/{locale}",
            get(translations::get_translation).delete(translations::delete_translation),
        )
        // Sharing
        .route(
            "/api/summaries/{id}/access-keys",
            get(access_keys::list_access_keys).post(access_keys::create_access_key),
        )
        .route("/api/access-keys/{id}", axum::routing::delete(access_keys::deactivate_access_key))
        .route("/api/access-keys/{id}/qr", get(access_keys::access_key_qr))
        // Profile
        .route("/api/profile", get(profile::get_profile).put(profile::update_profile))
        // Middleware
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            auth::auth_middleware,
        ))
        .layer(DefaultBodyLimit::max(max_body))
        .layer(RequestBodyLimitLayer::new(max_body))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use discharger_core::MockLlmClient;
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    fn router(auth_enabled: bool) -> (Router, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config::ServerConfig::default();
        config.storage.data_dir = dir.path().to_path_buf();
        config.auth.enabled = auth_enabled;
        let state = AppState::open(
            config,
            Arc::new(MockLlmClient::new(json!({ "blocks": [] }))),
            Arc::new(sms::RecordingSms::new()),
        )
        .unwrap();
        (build_router(Arc::new(state)), dir)
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health_is_public() {
        let (app, _dir) = router(true);
        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["status"], "ok");
    }

    #[tokio::test]
    async fn test_api_requires_auth_when_enabled() {
        let (app, _dir) = router(true);
        let response = app
            .oneshot(Request::get("/api/patients").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_json(response).await["error"], "unauthorized");
    }

    #[tokio::test]
    async fn test_public_summary_without_key_is_unauthorized() {
        let (app, _dir) = router(true);
        let response = app
            .oneshot(Request::get("/public/summary").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_dev_user_when_auth_disabled() {
        let (app, _dir) = router(false);
        let response = app
            .oneshot(Request::get("/api/profile").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["userId"], auth::DEV_USER_ID);
    }
}
