//! Patient access keys: creation, listing, deactivation and QR codes.

use axum::{
    extract::{Path, Request, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
};
use discharger_core::{AccessRole, PatientAccessKey, PatientSummary};
use discharger_store::Operation;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::summaries::ensure_not_archived;
use super::{
    internal, invalid, invalid_field, new_id, not_found, now, owned, parse_json, store_error,
    HandlerResult,
};
use crate::audit::{self, AuditContext};
use crate::auth::AuthUser;
use crate::share;
use crate::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAccessKey {
    pub phone_number: String,
    pub role: String,
    #[serde(default)]
    pub send_sms: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessKeyView {
    #[serde(flatten)]
    pub key: PatientAccessKey,
    pub share_url: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedAccessKey {
    pub key: PatientAccessKey,
    pub share_url: String,
    pub sms_sent: bool,
}

fn share_url(state: &AppState, key: &PatientAccessKey) -> String {
    share::share_link(state.config.public_base_url(), &key.token)
}

/// An access key is managed through the summary it opens
fn owned_key(
    state: &AppState,
    user: &AuthUser,
    id: &str,
) -> HandlerResult<(PatientAccessKey, PatientSummary)> {
    let key = state
        .store
        .get_access_key(id)
        .map_err(store_error)?
        .ok_or_else(|| not_found("PatientAccessKey", id))?;
    let summary = owned(state.store.get_summary(&key.summary_id), user, &key.summary_id)?;
    Ok((key, summary))
}

/// POST /api/summaries/{id}/access-keys
///
/// A failed SMS is reported as `smsSent: false`; the key stays valid.
pub async fn create_access_key(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    audit_ctx: AuditContext,
    Path(id): Path<String>,
    request: Request,
) -> HandlerResult<(StatusCode, Json<CreatedAccessKey>)> {
    let summary = owned(state.store.get_summary(&id), &user, &id)?;
    ensure_not_archived(&summary)?;
    let input: CreateAccessKey = parse_json(request).await?;

    let phone_number = share::normalize_phone(&input.phone_number)
        .ok_or_else(|| invalid_field("phoneNumber", "expected 7 to 15 digits, optionally prefixed with +"))?;
    let role = AccessRole::parse(input.role.trim())
        .ok_or_else(|| invalid_field("role", format!("unknown role '{}'", input.role)))?;

    let key = PatientAccessKey {
        id: new_id(),
        summary_id: summary.id.clone(),
        phone_number,
        role,
        token: share::generate_token(),
        is_active: true,
        created_at: now(),
        last_accessed_at: None,
    };
    state.store.insert_access_key(&key).map_err(store_error)?;
    let url = share_url(&state, &key);

    let sms_sent = if input.send_sms {
        let message = share::share_message(&summary.title, &url);
        match state.sms.send(&key.phone_number, &message).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(access_key_id = %key.id, error = %e, "Failed to send share SMS");
                false
            }
        }
    } else {
        false
    };

    tracing::info!(summary_id = %id, access_key_id = %key.id, role = role.as_str(), sms_sent, "Created access key");
    audit::log_operation_success(&audit_ctx, Operation::Share, "PatientAccessKey", &key.id, &state.audit);
    Ok((
        StatusCode::CREATED,
        Json(CreatedAccessKey {
            key,
            share_url: url,
            sms_sent,
        }),
    ))
}

/// GET /api/summaries/{id}/access-keys
pub async fn list_access_keys(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<String>,
) -> HandlerResult<Json<Vec<AccessKeyView>>> {
    owned(state.store.get_summary(&id), &user, &id)?;
    let keys = state.store.list_access_keys(&id).map_err(store_error)?;
    Ok(Json(
        keys.into_iter()
            .map(|key| AccessKeyView {
                share_url: share_url(&state, &key),
                key,
            })
            .collect(),
    ))
}

/// DELETE /api/access-keys/{id}
///
/// Keys are deactivated, never removed, so access history stays readable.
pub async fn deactivate_access_key(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    audit_ctx: AuditContext,
    Path(id): Path<String>,
) -> HandlerResult<StatusCode> {
    owned_key(&state, &user, &id)?;
    state.store.deactivate_access_key(&id).map_err(store_error)?;

    audit::log_operation_success(&audit_ctx, Operation::Delete, "PatientAccessKey", &id, &state.audit);
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/access-keys/{id}/qr
pub async fn access_key_qr(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<String>,
) -> HandlerResult<Response> {
    let (key, _) = owned_key(&state, &user, &id)?;
    if !key.is_active {
        return Err(invalid(format!("Access key {} is inactive", id)));
    }

    let svg = share::qr_svg(&share_url(&state, &key))
        .map_err(|e| internal("Failed to render QR code", e))?;
    Ok(([(header::CONTENT_TYPE, "image/svg+xml")], svg).into_response())
}
