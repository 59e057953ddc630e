use axum::{
    extract::{Request, State},
    response::Json,
};
use discharger_core::translation::canonical_locale;
use discharger_core::UserProfile;
use discharger_store::Operation;
use serde::Deserialize;
use std::sync::Arc;

use super::{invalid_field, now, optional_text, parse_json, store_error, HandlerResult};
use crate::audit::{self, AuditContext};
use crate::auth::AuthUser;
use crate::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileInput {
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub specialty: Option<String>,
    #[serde(default)]
    pub institution: Option<String>,
    #[serde(default)]
    pub preferred_locale: Option<String>,
}

fn load_or_default(state: &AppState, user: &AuthUser) -> HandlerResult<UserProfile> {
    Ok(state
        .store
        .get_profile(&user.user_id)
        .map_err(store_error)?
        .unwrap_or_else(|| UserProfile::new(user.user_id.clone(), &now())))
}

/// GET /api/profile
///
/// First access creates the profile with defaults.
pub async fn get_profile(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> HandlerResult<Json<UserProfile>> {
    if let Some(profile) = state.store.get_profile(&user.user_id).map_err(store_error)? {
        return Ok(Json(profile));
    }

    let profile = UserProfile::new(user.user_id.clone(), &now());
    state.store.upsert_profile(&profile).map_err(store_error)?;
    tracing::info!(user_id = %user.user_id, "Created profile");
    Ok(Json(profile))
}

/// PUT /api/profile
pub async fn update_profile(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    audit_ctx: AuditContext,
    request: Request,
) -> HandlerResult<Json<UserProfile>> {
    let input: ProfileInput = parse_json(request).await?;
    let mut profile = load_or_default(&state, &user)?;

    if let Some(locale) = optional_text(input.preferred_locale) {
        profile.preferred_locale = canonical_locale(&locale)
            .map_err(|e| invalid_field("preferredLocale", e.to_string()))?;
    }
    profile.display_name = optional_text(input.display_name);
    profile.specialty = optional_text(input.specialty);
    profile.institution = optional_text(input.institution);
    profile.updated_at = now();

    state.store.upsert_profile(&profile).map_err(store_error)?;

    audit::log_operation_success(&audit_ctx, Operation::Update, "UserProfile", &user.user_id, &state.audit);
    Ok(Json(profile))
}
