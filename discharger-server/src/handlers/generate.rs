use axum::{
    extract::{Request, State},
    response::Json,
};
use discharger_core::generation::{generate_blocks, ContextDocument};
use discharger_core::schema::parse_block_types;
use discharger_core::{Block, BlockType};
use discharger_store::Operation;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::{parse_json, pipeline_error, referenced, required_text, store_error, HandlerResult};
use crate::audit::{self, AuditContext};
use crate::auth::AuthUser;
use crate::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRequest {
    pub text: String,
    pub block_types: Vec<String>,
    #[serde(default)]
    pub document_ids: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct GenerateResponse {
    pub blocks: Vec<Block>,
}

/// Stored document ids that still resolve. Deleted documents are skipped.
pub(crate) fn live_document_ids(
    state: &AppState,
    summary_id: &str,
    document_ids: &[String],
) -> HandlerResult<Vec<String>> {
    let mut live = Vec::with_capacity(document_ids.len());
    for id in document_ids {
        if state.store.get_document(id).map_err(store_error)?.is_some() {
            live.push(id.clone());
        } else {
            tracing::warn!(summary_id = %summary_id, document_id = %id, "Skipping deleted document");
        }
    }
    Ok(live)
}

/// Owned documents with extracted text, as model context
pub(crate) fn context_documents(
    state: &AppState,
    user: &AuthUser,
    document_ids: &[String],
) -> HandlerResult<Vec<ContextDocument>> {
    let mut documents = Vec::new();
    for id in document_ids {
        let document = referenced(state.store.get_document(id), user, id)?;
        match document.full_text {
            Some(text) => documents.push(ContextDocument {
                id: document.id,
                name: document.file_name,
                text,
            }),
            None => tracing::debug!(document_id = %id, "Document has no text, not used as context"),
        }
    }
    Ok(documents)
}

/// Run the generation pipeline and log the outcome
pub(crate) async fn run_generation(
    state: &AppState,
    audit_ctx: &AuditContext,
    entity_id: Option<&str>,
    text: &str,
    block_types: &[BlockType],
    documents: &[ContextDocument],
) -> HandlerResult<Vec<Block>> {
    match generate_blocks(state.llm.as_ref(), text, block_types, documents).await {
        Ok(blocks) => Ok(blocks),
        Err(e) => {
            audit::log_operation_error(
                audit_ctx,
                Operation::Generate,
                "PatientSummary",
                entity_id,
                &e.to_string(),
                &state.audit,
            );
            Err(pipeline_error(e, "Failed to generate blocks"))
        }
    }
}

/// POST /api/generate
///
/// Nothing is persisted; the caller saves the blocks with a summary.
pub async fn generate(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    audit_ctx: AuditContext,
    request: Request,
) -> HandlerResult<Json<GenerateResponse>> {
    let input: GenerateRequest = parse_json(request).await?;
    let text = required_text("text", &input.text)?;
    let block_types = parse_block_types(&input.block_types)
        .map_err(|e| pipeline_error(e, "Failed to generate blocks"))?;
    let documents = context_documents(&state, &user, &input.document_ids)?;

    let blocks = run_generation(&state, &audit_ctx, None, &text, &block_types, &documents).await?;

    let requested = block_types
        .iter()
        .map(|t| t.as_str())
        .collect::<Vec<_>>()
        .join(",");
    audit::log_operation_success(&audit_ctx, Operation::Generate, "BlockTypes", &requested, &state.audit);
    Ok(Json(GenerateResponse { blocks }))
}
