use axum::{
    extract::{Path, Request, State},
    http::StatusCode,
    response::Json,
};
use discharger_core::Snippet;
use discharger_store::Operation;
use serde::Deserialize;
use std::sync::Arc;

use super::{new_id, now, owned, parse_json, required_text, store_error, HandlerResult};
use crate::audit::{self, AuditContext};
use crate::auth::AuthUser;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct SnippetInput {
    pub title: String,
    pub content: String,
}

/// POST /api/snippets
pub async fn create_snippet(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    audit_ctx: AuditContext,
    request: Request,
) -> HandlerResult<(StatusCode, Json<Snippet>)> {
    let input: SnippetInput = parse_json(request).await?;
    let now = now();

    let snippet = Snippet {
        id: new_id(),
        owner_id: user.user_id,
        title: required_text("title", &input.title)?,
        content: required_text("content", &input.content)?,
        created_at: now.clone(),
        updated_at: now,
    };
    state.store.insert_snippet(&snippet).map_err(store_error)?;

    audit::log_operation_success(&audit_ctx, Operation::Create, "Snippet", &snippet.id, &state.audit);
    Ok((StatusCode::CREATED, Json(snippet)))
}

/// GET /api/snippets
pub async fn list_snippets(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> HandlerResult<Json<Vec<Snippet>>> {
    Ok(Json(state.store.list_snippets(&user.user_id).map_err(store_error)?))
}

/// GET /api/snippets/{id}
pub async fn get_snippet(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<String>,
) -> HandlerResult<Json<Snippet>> {
    Ok(Json(owned(state.store.get_snippet(&id), &user, &id)?))
}

/// PUT /api/snippets/{id}
pub async fn update_snippet(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    audit_ctx: AuditContext,
    Path(id): Path<String>,
    request: Request,
) -> HandlerResult<Json<Snippet>> {
    let mut snippet = owned(state.store.get_snippet(&id), &user, &id)?;
    let input: SnippetInput = parse_json(request).await?;

    snippet.title = required_text("title", &input.title)?;
    snippet.content = required_text("content", &input.content)?;
    snippet.updated_at = now();
    state.store.update_snippet(&snippet).map_err(store_error)?;

    audit::log_operation_success(&audit_ctx, Operation::Update, "Snippet", &id, &state.audit);
    Ok(Json(snippet))
}

/// DELETE /api/snippets/{id}
pub async fn delete_snippet(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    audit_ctx: AuditContext,
    Path(id): Path<String>,
) -> HandlerResult<StatusCode> {
    owned(state.store.get_snippet(&id), &user, &id)?;
    state.store.delete_snippet(&id).map_err(store_error)?;

    audit::log_operation_success(&audit_ctx, Operation::Delete, "Snippet", &id, &state.audit);
    Ok(StatusCode::NO_CONTENT)
}
