use axum::{
    extract::{Path, Request, State},
    http::StatusCode,
    response::Json,
};
use discharger_core::translation::{canonical_locale, translate_blocks};
use discharger_core::SummaryTranslation;
use discharger_store::Operation;
use serde::Deserialize;
use std::sync::Arc;

use super::summaries::ensure_not_archived;
use super::{
    conflict, invalid_field, not_found, now, owned, parse_json, pipeline_error, store_error,
    HandlerResult,
};
use crate::audit::{self, AuditContext};
use crate::auth::AuthUser;
use crate::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTranslation {
    pub locale: String,
    /// Defaults to the summary's preferred locale
    #[serde(default)]
    pub source_locale: Option<String>,
}

fn path_locale(locale: &str) -> HandlerResult<String> {
    canonical_locale(locale).map_err(|e| invalid_field("locale", e.to_string()))
}

/// POST /api/summaries/{id}/translations
pub async fn create_translation(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    audit_ctx: AuditContext,
    Path(id): Path<String>,
    request: Request,
) -> HandlerResult<(StatusCode, Json<SummaryTranslation>)> {
    let summary = owned(state.store.get_summary(&id), &user, &id)?;
    ensure_not_archived(&summary)?;
    let input: CreateTranslation = parse_json(request).await?;

    let locale =
        canonical_locale(&input.locale).map_err(|e| invalid_field("locale", e.to_string()))?;
    let source_locale = match input.source_locale {
        Some(source) => canonical_locale(&source)
            .map_err(|e| invalid_field("sourceLocale", e.to_string()))?,
        None => summary.preferred_locale.clone(),
    };
    if locale.eq_ignore_ascii_case(&source_locale) {
        return Err(invalid_field(
            "locale",
            format!("target locale equals source locale '{}'", source_locale),
        ));
    }

    // Checked before the model call; the unique constraint covers races
    if state
        .store
        .get_translation(&id, &locale)
        .map_err(store_error)?
        .is_some()
    {
        return Err(conflict(format!(
            "Summary {} already has a '{}' translation",
            id, locale
        )));
    }

    let blocks = match translate_blocks(state.llm.as_ref(), &summary.blocks, &source_locale, &locale).await {
        Ok(blocks) => blocks,
        Err(e) => {
            audit::log_operation_error(
                &audit_ctx,
                Operation::Translate,
                "PatientSummary",
                Some(&id),
                &e.to_string(),
                &state.audit,
            );
            return Err(pipeline_error(e, "Failed to translate summary"));
        }
    };

    let translation = SummaryTranslation {
        summary_id: id.clone(),
        locale,
        source_locale,
        blocks,
        created_at: now(),
    };
    // Rejected if the blocks were edited while the model was running
    state
        .store
        .insert_translation_of(&translation, &summary.blocks)
        .map_err(store_error)?;

    tracing::info!(summary_id = %id, locale = %translation.locale, "Stored translation");
    audit::log_operation_success(&audit_ctx, Operation::Translate, "PatientSummary", &id, &state.audit);
    Ok((StatusCode::CREATED, Json(translation)))
}

/// GET /api/summaries/{id}/translations
pub async fn list_translations(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<String>,
) -> HandlerResult<Json<Vec<SummaryTranslation>>> {
    owned(state.store.get_summary(&id), &user, &id)?;
    Ok(Json(state.store.list_translations(&id).map_err(store_error)?))
}

/// GET /api/summaries/{id}/translations/{locale}
pub async fn get_translation(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path((id, locale)): Path<(String, String)>,
) -> HandlerResult<Json<SummaryTranslation>> {
    owned(state.store.get_summary(&id), &user, &id)?;
    let locale = path_locale(&locale)?;
    state
        .store
        .get_translation(&id, &locale)
        .map_err(store_error)?
        .map(Json)
        .ok_or_else(|| not_found("SummaryTranslation", &format!("{}/{}", id, locale)))
}

/// DELETE /api/summaries/{id}/translations/{locale}
pub async fn delete_translation(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    audit_ctx: AuditContext,
    Path((id, locale)): Path<(String, String)>,
) -> HandlerResult<StatusCode> {
    owned(state.store.get_summary(&id), &user, &id)?;
    let locale = path_locale(&locale)?;
    if !state
        .store
        .delete_translation(&id, &locale)
        .map_err(store_error)?
    {
        return Err(not_found("SummaryTranslation", &format!("{}/{}", id, locale)));
    }

    audit::log_operation_success(
        &audit_ctx,
        Operation::Delete,
        "SummaryTranslation",
        &format!("{}/{}", id, locale),
        &state.audit,
    );
    Ok(StatusCode::NO_CONTENT)
}
