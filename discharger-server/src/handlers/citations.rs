use axum::{
    extract::{Path, Request, State},
    response::Json,
};
use discharger_core::citation::{find_highlight, render_marked, segments, Highlight, Segment};
use discharger_core::{Citation, CitationSource};
use serde::Serialize;
use std::sync::Arc;

use super::{invalid, invalid_field, owned, parse_json, referenced, HandlerResult};
use crate::auth::AuthUser;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct CitationView {
    pub highlight: Option<Highlight>,
    pub segments: Vec<Segment>,
    pub marked: String,
}

/// POST /api/summaries/{id}/citations
///
/// Resolves the cited source text and locates the excerpt in it.
pub async fn highlight_citation(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<String>,
    request: Request,
) -> HandlerResult<Json<CitationView>> {
    let summary = owned(state.store.get_summary(&id), &user, &id)?;
    let citation: Citation = parse_json(request).await?;

    let source = match citation.source {
        CitationSource::Context => summary.discharge_text,
        CitationSource::Document => {
            let document_id = citation
                .document_id
                .as_deref()
                .ok_or_else(|| invalid_field("documentId", "required for document citations"))?;
            let document = referenced(state.store.get_document(document_id), &user, document_id)?;
            document.full_text.ok_or_else(|| {
                invalid(format!("Document {} has no extracted text", document_id))
            })?
        }
    };

    let highlight = find_highlight(&source, &citation.excerpt);
    if highlight.is_none() {
        tracing::debug!(summary_id = %id, "Citation excerpt not found in source");
    }

    Ok(Json(CitationView {
        segments: segments(&source, highlight.as_ref()),
        marked: render_marked(&source, highlight.as_ref()),
        highlight,
    }))
}
