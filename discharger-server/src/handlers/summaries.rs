use axum::{
    extract::{Path, Query, Request, State},
    http::StatusCode,
    response::Json,
};
use discharger_core::block::block_types_of;
use discharger_core::schema::parse_block_types;
use discharger_core::translation::canonical_locale;
use discharger_core::{reconcile_blocks, BlockDraft, PatientSummary, SummaryStatus};
use discharger_store::Operation;
use serde::Deserialize;
use std::sync::Arc;

use super::generate::{context_documents, live_document_ids, run_generation};
use super::{
    invalid, invalid_field, new_id, now, optional_text, owned, parse_json, parse_json_or_default,
    pipeline_error, referenced, store_error, HandlerResult,
};
use crate::audit::{self, AuditContext};
use crate::auth::AuthUser;
use crate::AppState;

const DEFAULT_TITLE: &str = "Discharge summary";
const DEFAULT_LOCALE: &str = "en";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSummary {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub patient_id: Option<String>,
    pub discharge_text: String,
    #[serde(default)]
    pub blocks: Vec<BlockDraft>,
    #[serde(default)]
    pub document_ids: Vec<String>,
    #[serde(default)]
    pub preferred_locale: Option<String>,
}

/// Absent fields stay unchanged; an empty `patientId` unlinks the patient
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateSummary {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub patient_id: Option<String>,
    #[serde(default)]
    pub discharge_text: Option<String>,
    #[serde(default)]
    pub document_ids: Option<Vec<String>>,
    #[serde(default)]
    pub preferred_locale: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ReplaceBlocks {
    pub blocks: Vec<BlockDraft>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Regenerate {
    /// Defaults to the types currently on the summary
    #[serde(default)]
    pub block_types: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
pub struct ChangeStatus {
    pub status: String,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub status: Option<String>,
}

fn checked_locale(locale: String) -> HandlerResult<String> {
    canonical_locale(&locale).map_err(|e| invalid_field("preferredLocale", e.to_string()))
}

/// Patient and documents referenced by a summary must belong to the caller
fn check_references(
    state: &AppState,
    user: &AuthUser,
    patient_id: Option<&str>,
    document_ids: &[String],
) -> HandlerResult<()> {
    if let Some(patient_id) = patient_id {
        referenced(state.store.get_patient(patient_id), user, patient_id)?;
    }
    for id in document_ids {
        referenced(state.store.get_document(id), user, id)?;
    }
    Ok(())
}

/// Forget a stored patient or documents deleted since they were linked
fn drop_dangling(state: &AppState, summary: &mut PatientSummary) -> HandlerResult<()> {
    if let Some(patient_id) = summary.patient_id.as_deref()
        && state.store.get_patient(patient_id).map_err(store_error)?.is_none()
    {
        tracing::warn!(summary_id = %summary.id, patient_id = %patient_id, "Unlinking deleted patient");
        summary.patient_id = None;
    }
    summary.document_ids = live_document_ids(state, &summary.id, &summary.document_ids)?;
    Ok(())
}

/// Archived summaries are read-only
pub(crate) fn ensure_not_archived(summary: &PatientSummary) -> HandlerResult<()> {
    if summary.status == SummaryStatus::Archived {
        return Err(invalid(format!(
            "Summary {} is archived; restore it to draft first",
            summary.id
        )));
    }
    Ok(())
}

/// POST /api/summaries
pub async fn create_summary(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    audit_ctx: AuditContext,
    request: Request,
) -> HandlerResult<(StatusCode, Json<PatientSummary>)> {
    let input: CreateSummary = parse_json(request).await?;
    let patient_id = optional_text(input.patient_id);
    check_references(&state, &user, patient_id.as_deref(), &input.document_ids)?;

    let preferred_locale = match optional_text(input.preferred_locale) {
        Some(locale) => checked_locale(locale)?,
        None => state
            .store
            .get_profile(&user.user_id)
            .map_err(store_error)?
            .map(|p| p.preferred_locale)
            .unwrap_or_else(|| DEFAULT_LOCALE.to_string()),
    };

    let now = now();
    let blocks = reconcile_blocks(&[], input.blocks, &now)
        .map_err(|e| pipeline_error(e, "Failed to save blocks"))?;

    let summary = PatientSummary {
        id: new_id(),
        owner_id: user.user_id,
        patient_id,
        title: optional_text(input.title).unwrap_or_else(|| DEFAULT_TITLE.to_string()),
        blocks,
        discharge_text: input.discharge_text,
        document_ids: input.document_ids,
        status: SummaryStatus::Draft,
        preferred_locale,
        created_at: now.clone(),
        updated_at: now,
    };
    state.store.insert_summary(&summary).map_err(store_error)?;

    audit::log_operation_success(&audit_ctx, Operation::Create, "PatientSummary", &summary.id, &state.audit);
    Ok((StatusCode::CREATED, Json(summary)))
}

/// GET /api/summaries?status=
pub async fn list_summaries(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Query(query): Query<ListQuery>,
) -> HandlerResult<Json<Vec<PatientSummary>>> {
    let status = match query.status.as_deref() {
        Some(s) => Some(
            SummaryStatus::parse(s)
                .ok_or_else(|| invalid_field("status", format!("unknown status '{}'", s)))?,
        ),
        None => None,
    };
    let summaries = state
        .store
        .list_summaries(&user.user_id, status)
        .map_err(store_error)?;
    Ok(Json(summaries))
}

/// GET /api/summaries/{id}
pub async fn get_summary(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<String>,
) -> HandlerResult<Json<PatientSummary>> {
    Ok(Json(owned(state.store.get_summary(&id), &user, &id)?))
}

/// PUT /api/summaries/{id}
pub async fn update_summary(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    audit_ctx: AuditContext,
    Path(id): Path<String>,
    request: Request,
) -> HandlerResult<Json<PatientSummary>> {
    let mut summary = owned(state.store.get_summary(&id), &user, &id)?;
    let input: UpdateSummary = parse_json(request).await?;

    // Only references supplied now are checked; stale stored ones are dropped
    drop_dangling(&state, &mut summary)?;
    let patient_id = input.patient_id.map(|p| optional_text(Some(p)));
    check_references(
        &state,
        &user,
        patient_id.as_ref().and_then(|p| p.as_deref()),
        input.document_ids.as_deref().unwrap_or_default(),
    )?;

    if let Some(title) = input.title {
        summary.title = super::required_text("title", &title)?;
    }
    if let Some(patient_id) = patient_id {
        summary.patient_id = patient_id;
    }
    if let Some(text) = input.discharge_text {
        summary.discharge_text = text;
    }
    if let Some(document_ids) = input.document_ids {
        summary.document_ids = document_ids;
    }
    if let Some(locale) = input.preferred_locale {
        summary.preferred_locale = checked_locale(locale.trim().to_string())?;
    }

    summary.updated_at = now();
    state.store.update_summary_details(&summary).map_err(store_error)?;

    audit::log_operation_success(&audit_ctx, Operation::Update, "PatientSummary", &id, &state.audit);
    Ok(Json(summary))
}

/// PUT /api/summaries/{id}/blocks
///
/// Stored translations become stale and are removed with the same write.
pub async fn replace_blocks(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    audit_ctx: AuditContext,
    Path(id): Path<String>,
    request: Request,
) -> HandlerResult<Json<PatientSummary>> {
    let mut summary = owned(state.store.get_summary(&id), &user, &id)?;
    ensure_not_archived(&summary)?;
    let input: ReplaceBlocks = parse_json(request).await?;

    let now = now();
    summary.blocks = reconcile_blocks(&summary.blocks, input.blocks, &now)
        .map_err(|e| pipeline_error(e, "Failed to save blocks"))?;
    summary.updated_at = now;

    let removed = state
        .store
        .replace_blocks(&id, &summary.blocks, &summary.updated_at)
        .map_err(store_error)?;

    tracing::info!(summary_id = %id, blocks = summary.blocks.len(), translations_removed = removed, "Replaced blocks");
    audit::log_operation_success(&audit_ctx, Operation::Update, "PatientSummary", &id, &state.audit);
    Ok(Json(summary))
}

/// POST /api/summaries/{id}/regenerate
pub async fn regenerate(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    audit_ctx: AuditContext,
    Path(id): Path<String>,
    request: Request,
) -> HandlerResult<Json<PatientSummary>> {
    let mut summary = owned(state.store.get_summary(&id), &user, &id)?;
    ensure_not_archived(&summary)?;
    let input: Regenerate = parse_json_or_default(request).await?;

    if summary.discharge_text.trim().is_empty() {
        return Err(invalid_field("dischargeText", "summary has no discharge text to generate from"));
    }

    let block_types = match input.block_types {
        Some(names) => parse_block_types(&names),
        None => {
            let current: Vec<&str> = block_types_of(&summary.blocks)
                .iter()
                .map(|t| t.as_str())
                .collect();
            parse_block_types(&current)
        }
    }
    .map_err(|e| pipeline_error(e, "Failed to generate blocks"))?;

    let document_ids = live_document_ids(&state, &id, &summary.document_ids)?;
    let documents = context_documents(&state, &user, &document_ids)?;
    let blocks = run_generation(
        &state,
        &audit_ctx,
        Some(&id),
        &summary.discharge_text,
        &block_types,
        &documents,
    )
    .await?;

    summary.blocks = blocks;
    summary.updated_at = now();
    let removed = state
        .store
        .replace_blocks(&id, &summary.blocks, &summary.updated_at)
        .map_err(store_error)?;

    tracing::info!(summary_id = %id, translations_removed = removed, "Regenerated blocks");
    audit::log_operation_success(&audit_ctx, Operation::Generate, "PatientSummary", &id, &state.audit);
    Ok(Json(summary))
}

/// PUT /api/summaries/{id}/status
pub async fn change_status(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    audit_ctx: AuditContext,
    Path(id): Path<String>,
    request: Request,
) -> HandlerResult<Json<PatientSummary>> {
    let mut summary = owned(state.store.get_summary(&id), &user, &id)?;
    let input: ChangeStatus = parse_json(request).await?;

    let next = SummaryStatus::parse(&input.status)
        .ok_or_else(|| invalid_field("status", format!("unknown status '{}'", input.status)))?;
    if !summary.status.can_transition_to(next) {
        return Err(invalid(format!(
            "Cannot change status from {} to {}",
            summary.status.as_str(),
            next.as_str()
        )));
    }

    summary.status = next;
    summary.updated_at = now();
    state
        .store
        .update_summary_status(&id, next, &summary.updated_at)
        .map_err(store_error)?;

    audit::log_operation_success(&audit_ctx, Operation::Update, "PatientSummary", &id, &state.audit);
    Ok(Json(summary))
}

/// DELETE /api/summaries/{id}
pub async fn delete_summary(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    audit_ctx: AuditContext,
    Path(id): Path<String>,
) -> HandlerResult<StatusCode> {
    owned(state.store.get_summary(&id), &user, &id)?;
    state.store.delete_summary(&id).map_err(store_error)?;

    audit::log_operation_success(&audit_ctx, Operation::Delete, "PatientSummary", &id, &state.audit);
    Ok(StatusCode::NO_CONTENT)
}
