//! Session-free summary view for patients and caregivers.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::Json,
};
use discharger_core::{AccessRole, Block, ErrorBody, SummaryStatus};
use discharger_store::Operation;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::{not_found, now, store_error, HandlerError, HandlerResult};
use crate::audit::{self, AuditContext};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct PublicQuery {
    pub key: Option<String>,
    pub locale: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicSummary {
    pub summary_id: String,
    pub title: String,
    pub status: SummaryStatus,
    /// Locale of `blocks`
    pub locale: String,
    pub available_locales: Vec<String>,
    pub role: AccessRole,
    pub blocks: Vec<Block>,
}

fn unauthorized(message: &str) -> HandlerError {
    (StatusCode::UNAUTHORIZED, Json(ErrorBody::unauthorized(message)))
}

/// GET /public/summary?key=…&locale=…
///
/// Falls back to the original blocks when `locale` has no translation.
pub async fn public_summary(
    State(state): State<Arc<AppState>>,
    audit_ctx: AuditContext,
    Query(query): Query<PublicQuery>,
) -> HandlerResult<Json<PublicSummary>> {
    let token = query
        .key
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| unauthorized("Missing access key"))?;

    let key = match state.store.get_access_key_by_token(token).map_err(store_error)? {
        Some(key) if key.is_active => key,
        _ => {
            audit::log_operation_error(
                &audit_ctx,
                Operation::PublicView,
                "PatientAccessKey",
                None,
                "invalid or inactive access key",
                &state.audit,
            );
            return Err(unauthorized("Invalid or inactive access key"));
        }
    };

    let summary = state
        .store
        .get_summary(&key.summary_id)
        .map_err(store_error)?
        .filter(|s| s.status != SummaryStatus::Archived)
        .ok_or_else(|| not_found("PatientSummary", &key.summary_id))?;

    let translations = state
        .store
        .list_translations(&summary.id)
        .map_err(store_error)?;

    let mut available_locales = vec![summary.preferred_locale.clone()];
    available_locales.extend(translations.iter().map(|t| t.locale.clone()));

    let requested = query.locale.as_deref().map(str::trim).filter(|l| !l.is_empty());
    let (locale, blocks) = match requested
        .and_then(|l| translations.into_iter().find(|t| t.locale.eq_ignore_ascii_case(l)))
    {
        Some(translation) => (translation.locale, translation.blocks),
        None => (summary.preferred_locale.clone(), summary.blocks),
    };

    if let Err(e) = state.store.touch_access_key(&key.id, &now()) {
        tracing::warn!(access_key_id = %key.id, error = %e, "Failed to record access time");
    }
    audit::log_operation_success(&audit_ctx, Operation::PublicView, "PatientSummary", &summary.id, &state.audit);

    Ok(Json(PublicSummary {
        summary_id: summary.id,
        title: summary.title,
        status: summary.status,
        locale,
        available_locales,
        role: key.role,
        blocks,
    }))
}
