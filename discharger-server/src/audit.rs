use axum::{
    extract::{ConnectInfo, FromRequestParts},
    http::{request::Parts, Extensions},
};
use discharger_store::{AuditLog, Operation};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::auth::AuthUser;

/// Audit context extracted from HTTP request
#[derive(Debug, Clone)]
pub struct AuditContext {
    pub user_id: Option<String>,
    pub client_ip: String,
}

impl AuditContext {
    /// Create audit context without connection info (for testing)
    pub fn new(user_id: Option<String>, client_ip: String) -> Self {
        Self { user_id, client_ip }
    }

    pub fn from_extensions(extensions: &Extensions) -> Self {
        let user_id = extensions.get::<AuthUser>().map(|u| u.user_id.clone());
        Self {
            user_id,
            client_ip: client_ip(extensions),
        }
    }
}

impl<S: Send + Sync> FromRequestParts<S> for AuditContext {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self::from_extensions(&parts.extensions))
    }
}

/// Peer address when the server was started with connect info
pub fn client_ip(extensions: &Extensions) -> String {
    extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ci| ci.0.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Log a successful operation
pub fn log_operation_success(
    context: &AuditContext,
    operation: Operation,
    entity_type: &str,
    entity_id: &str,
    audit_log: &Arc<Mutex<AuditLog>>,
) {
    tracing::info!(
        user_id = context.user_id.as_deref().unwrap_or("anonymous"),
        client_ip = %context.client_ip,
        operation = operation.as_str(),
        entity_type = entity_type,
        entity_id = entity_id,
        status = "success",
        "Audit: {} {}/{}",
        operation.as_str(),
        entity_type,
        entity_id
    );

    // Write to database asynchronously in a spawned task
    let context = context.clone();
    let entity_type = entity_type.to_string();
    let entity_id = entity_id.to_string();
    let audit_log = Arc::clone(audit_log);

    tokio::spawn(async move {
        let audit = audit_log.lock().await;
        if let Err(e) = audit.log_success(
            operation,
            &entity_type,
            &entity_id,
            context.user_id.as_deref(),
            Some(&context.client_ip),
        ) {
            tracing::error!("Failed to write audit log to database: {}", e);
        }
    });
}

/// Log a failed operation
pub fn log_operation_error(
    context: &AuditContext,
    operation: Operation,
    entity_type: &str,
    entity_id: Option<&str>,
    error: &str,
    audit_log: &Arc<Mutex<AuditLog>>,
) {
    tracing::warn!(
        user_id = context.user_id.as_deref().unwrap_or("anonymous"),
        client_ip = %context.client_ip,
        operation = operation.as_str(),
        entity_type = entity_type,
        entity_id = entity_id.unwrap_or("N/A"),
        status = "error",
        error = error,
        "Audit: {} {} failed: {}",
        operation.as_str(),
        entity_type,
        error
    );

    let context = context.clone();
    let entity_type = entity_type.to_string();
    let entity_id = entity_id.map(|s| s.to_string());
    let error = error.to_string();
    let audit_log = Arc::clone(audit_log);

    tokio::spawn(async move {
        let audit = audit_log.lock().await;
        if let Err(e) = audit.log_error(
            operation,
            Some(&entity_type),
            entity_id.as_deref(),
            context.user_id.as_deref(),
            Some(&context.client_ip),
            &error,
        ) {
            tracing::error!("Failed to write audit log to database: {}", e);
        }
    });
}

/// Log an authentication attempt
pub fn log_auth_attempt(client_ip: &str, user_id: Option<&str>, success: bool) {
    if success {
        tracing::debug!(
            user_id = user_id.unwrap_or("unknown"),
            client_ip = %client_ip,
            status = "success",
            "Audit: Authentication successful"
        );
    } else {
        tracing::warn!(
            client_ip = %client_ip,
            status = "failed",
            "Audit: Authentication failed"
        );
    }
}
