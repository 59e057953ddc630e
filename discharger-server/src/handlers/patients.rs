use axum::{
    extract::{Path, Request, State},
    http::StatusCode,
    response::Json,
};
use discharger_core::Patient;
use discharger_store::Operation;
use serde::Deserialize;
use std::sync::Arc;

use super::{
    invalid_field, new_id, now, optional_text, owned, parse_json, required_text, store_error,
    HandlerResult,
};
use crate::audit::{self, AuditContext};
use crate::auth::AuthUser;
use crate::share::normalize_phone;
use crate::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientInput {
    pub name: String,
    #[serde(default)]
    pub date_of_birth: Option<String>,
    #[serde(default)]
    pub phone_number: Option<String>,
    #[serde(default)]
    pub mrn: Option<String>,
}

/// Validated optional fields of a patient
#[derive(Debug)]
struct PatientFields {
    name: String,
    date_of_birth: Option<String>,
    phone_number: Option<String>,
    mrn: Option<String>,
}

fn validate(input: PatientInput) -> HandlerResult<PatientFields> {
    let name = required_text("name", &input.name)?;

    let date_of_birth = optional_text(input.date_of_birth);
    if let Some(ref dob) = date_of_birth
        && chrono::NaiveDate::parse_from_str(dob, "%Y-%m-%d").is_err()
    {
        return Err(invalid_field("dateOfBirth", "expected YYYY-MM-DD"));
    }

    let phone_number = match optional_text(input.phone_number) {
        Some(raw) => Some(
            normalize_phone(&raw).ok_or_else(|| invalid_field("phoneNumber", "not a phone number"))?,
        ),
        None => None,
    };

    Ok(PatientFields {
        name,
        date_of_birth,
        phone_number,
        mrn: optional_text(input.mrn),
    })
}

/// POST /api/patients
pub async fn create_patient(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    audit_ctx: AuditContext,
    request: Request,
) -> HandlerResult<(StatusCode, Json<Patient>)> {
    let fields = validate(parse_json(request).await?)?;
    let now = now();

    let patient = Patient {
        id: new_id(),
        owner_id: user.user_id,
        name: fields.name,
        date_of_birth: fields.date_of_birth,
        phone_number: fields.phone_number,
        mrn: fields.mrn,
        created_at: now.clone(),
        updated_at: now,
    };
    state.store.insert_patient(&patient).map_err(store_error)?;

    audit::log_operation_success(&audit_ctx, Operation::Create, "Patient", &patient.id, &state.audit);
    Ok((StatusCode::CREATED, Json(patient)))
}

/// GET /api/patients
pub async fn list_patients(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> HandlerResult<Json<Vec<Patient>>> {
    let patients = state.store.list_patients(&user.user_id).map_err(store_error)?;
    Ok(Json(patients))
}

/// GET /api/patients/{id}
pub async fn get_patient(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<String>,
) -> HandlerResult<Json<Patient>> {
    let patient = owned(state.store.get_patient(&id), &user, &id)?;
    Ok(Json(patient))
}

/// PUT /api/patients/{id}
pub async fn update_patient(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    audit_ctx: AuditContext,
    Path(id): Path<String>,
    request: Request,
) -> HandlerResult<Json<Patient>> {
    let mut patient = owned(state.store.get_patient(&id), &user, &id)?;
    let fields = validate(parse_json(request).await?)?;

    patient.name = fields.name;
    patient.date_of_birth = fields.date_of_birth;
    patient.phone_number = fields.phone_number;
    patient.mrn = fields.mrn;
    patient.updated_at = now();
    state.store.update_patient(&patient).map_err(store_error)?;

    audit::log_operation_success(&audit_ctx, Operation::Update, "Patient", &id, &state.audit);
    Ok(Json(patient))
}

/// DELETE /api/patients/{id}
pub async fn delete_patient(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    audit_ctx: AuditContext,
    Path(id): Path<String>,
) -> HandlerResult<StatusCode> {
    owned(state.store.get_patient(&id), &user, &id)?;
    state.store.delete_patient(&id).map_err(store_error)?;

    audit::log_operation_success(&audit_ctx, Operation::Delete, "Patient", &id, &state.audit);
    Ok(StatusCode::NO_CONTENT)
}
