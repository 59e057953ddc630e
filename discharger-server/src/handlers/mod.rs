pub mod access_keys;
pub mod citations;
pub mod documents;
pub mod generate;
pub mod health;
pub mod patients;
pub mod profile;
pub mod public;
pub mod snippets;
pub mod summaries;
pub mod translations;

use axum::{extract::Request, http::StatusCode, response::Json};
use discharger_core::{
    DischargerError, Document, ErrorBody, Patient, PatientSummary, Snippet,
};
use discharger_store::StoreError;
use http_body_util::BodyExt;
use serde::de::DeserializeOwned;

use crate::auth::AuthUser;

pub type HandlerError = (StatusCode, Json<ErrorBody>);
pub type HandlerResult<T> = Result<T, HandlerError>;

/// Read the request body as JSON into `T`
pub async fn parse_json<T: DeserializeOwned>(request: Request) -> HandlerResult<T> {
    let bytes = request
        .into_body()
        .collect()
        .await
        .map_err(|e| invalid(format!("Failed to read request body: {}", e)))?
        .to_bytes();

    if bytes.is_empty() {
        return Err(invalid("Request body is empty"));
    }

    serde_json::from_slice(&bytes).map_err(|e| invalid(format!("Invalid request body: {}", e)))
}

/// Like [`parse_json`], but an empty body yields `T::default()`
pub async fn parse_json_or_default<T: DeserializeOwned + Default>(
    request: Request,
) -> HandlerResult<T> {
    let bytes = request
        .into_body()
        .collect()
        .await
        .map_err(|e| invalid(format!("Failed to read request body: {}", e)))?
        .to_bytes();

    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }

    serde_json::from_slice(&bytes).map_err(|e| invalid(format!("Invalid request body: {}", e)))
}

pub fn invalid(message: impl Into<String>) -> HandlerError {
    (StatusCode::BAD_REQUEST, Json(ErrorBody::invalid(message)))
}

/// 400 with a single field-level issue
pub fn invalid_field(field: &str, message: impl Into<String>) -> HandlerError {
    let message = message.into();
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorBody::invalid(format!("Invalid field '{}'", field)).with_issue(field, message)),
    )
}

pub fn not_found(entity: &str, id: &str) -> HandlerError {
    (StatusCode::NOT_FOUND, Json(ErrorBody::not_found(entity, id)))
}

pub fn conflict(message: impl Into<String>) -> HandlerError {
    (StatusCode::CONFLICT, Json(ErrorBody::conflict(message)))
}

/// 500 with a generic message; the cause only goes to the log
pub fn internal(message: &str, cause: impl std::fmt::Display) -> HandlerError {
    tracing::error!(error = %cause, "{}", message);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorBody::internal(message)),
    )
}

pub fn store_error(e: StoreError) -> HandlerError {
    match e {
        StoreError::NotFound { entity, id } => not_found(&entity, &id),
        StoreError::Conflict(message) => conflict(message),
        other => internal("Storage error", other),
    }
}

/// Map a pipeline failure: caller mistakes are 400, the rest a generic 500
pub fn pipeline_error(e: DischargerError, public_message: &str) -> HandlerError {
    if e.is_client_error() {
        invalid(e.to_string())
    } else {
        internal(public_message, e)
    }
}

pub fn now() -> String {
    chrono::Utc::now().to_rfc3339()
}

pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Trimmed, non-empty value of a required text field
pub fn required_text(field: &str, value: &str) -> HandlerResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(invalid_field(field, "must not be blank"));
    }
    Ok(trimmed.to_string())
}

/// Trimmed optional text; blank becomes None
pub fn optional_text(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Records that belong to a single clinician
pub trait Owned {
    const ENTITY: &'static str;

    fn owner_id(&self) -> &str;
}

impl Owned for Patient {
    const ENTITY: &'static str = "Patient";

    fn owner_id(&self) -> &str {
        &self.owner_id
    }
}

impl Owned for Snippet {
    const ENTITY: &'static str = "Snippet";

    fn owner_id(&self) -> &str {
        &self.owner_id
    }
}

impl Owned for Document {
    const ENTITY: &'static str = "Document";

    fn owner_id(&self) -> &str {
        &self.owner_id
    }
}

impl Owned for PatientSummary {
    const ENTITY: &'static str = "PatientSummary";

    fn owner_id(&self) -> &str {
        &self.owner_id
    }
}

/// Missing → 404, someone else's → 403
pub fn owned<T: Owned>(
    found: Result<Option<T>, StoreError>,
    user: &AuthUser,
    id: &str,
) -> HandlerResult<T> {
    let record = found.map_err(store_error)?.ok_or_else(|| not_found(T::ENTITY, id))?;
    if record.owner_id() != user.user_id {
        tracing::warn!(
            user_id = %user.user_id,
            entity = T::ENTITY,
            id = id,
            "Access to another owner's record denied"
        );
        return Err((
            StatusCode::FORBIDDEN,
            Json(ErrorBody::forbidden(format!(
                "{} {} belongs to another user",
                T::ENTITY,
                id
            ))),
        ));
    }
    Ok(record)
}

/// For records named inside a request body or another record rather than in
/// the path: someone else's record is reported as missing.
pub fn referenced<T: Owned>(
    found: Result<Option<T>, StoreError>,
    user: &AuthUser,
    id: &str,
) -> HandlerResult<T> {
    let record = found.map_err(store_error)?.ok_or_else(|| not_found(T::ENTITY, id))?;
    if record.owner_id() != user.user_id {
        tracing::warn!(
            user_id = %user.user_id,
            entity = T::ENTITY,
            id = id,
            "Reference to another owner's record"
        );
        return Err(not_found(T::ENTITY, id));
    }
    Ok(record)
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::AuthType;
    use discharger_core::ErrorKind;

    fn snippet(owner: &str) -> Snippet {
        Snippet {
            id: "s1".to_string(),
            owner_id: owner.to_string(),
            title: "t".to_string(),
            content: "c".to_string(),
            created_at: now(),
            updated_at: now(),
        }
    }

    #[test]
    fn test_owned_checks() {
        let user = AuthUser::new("u1", AuthType::Jwt);

        assert!(owned(Ok(Some(snippet("u1"))), &user, "s1").is_ok());

        let (status, body) = owned(Ok(Some(snippet("u2"))), &user, "s1").unwrap_err();
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body.error, ErrorKind::Forbidden);

        let (status, body) = owned::<Snippet>(Ok(None), &user, "s1").unwrap_err();
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body.message, "Snippet not found: s1");
    }

    #[test]
    fn test_referenced_hides_other_owners() {
        let user = AuthUser::new("u1", AuthType::Jwt);

        assert!(referenced(Ok(Some(snippet("u1"))), &user, "s1").is_ok());

        let (status, body) = referenced(Ok(Some(snippet("u2"))), &user, "s1").unwrap_err();
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body.message, "Snippet not found: s1");
    }

    #[test]
    fn test_store_error_mapping() {
        let (status, _) = store_error(StoreError::Conflict("dup".to_string()));
        assert_eq!(status, StatusCode::CONFLICT);
        let (status, body) = store_error(StoreError::Other("disk on fire".to_string()));
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!body.message.contains("disk"));
    }

    #[test]
    fn test_pipeline_error_mapping() {
        let (status, _) = pipeline_error(DischargerError::NoBlockTypes, "Failed to generate blocks");
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (status, body) = pipeline_error(
            DischargerError::InvalidOutput("bad".to_string()),
            "Failed to generate blocks",
        );
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body.message, "Failed to generate blocks");
    }

    #[test]
    fn test_text_helpers() {
        assert_eq!(required_text("title", "  Hi ").unwrap(), "Hi");
        let (_, body) = required_text("title", "   ").unwrap_err();
        assert_eq!(body.issues[0].field, "title");
        assert_eq!(optional_text(Some("  ".to_string())), None);
        assert_eq!(optional_text(Some(" x ".to_string())).as_deref(), Some("x"));
    }

    #[tokio::test]
    async fn test_parse_json_errors() {
        #[derive(serde::Deserialize, Debug)]
        struct Body {
            #[allow(dead_code)]
            text: String,
        }

        let empty = Request::new(axum::body::Body::empty());
        let (status, _) = parse_json::<Body>(empty).await.unwrap_err();
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let wrong = Request::new(axum::body::Body::from(r#"{"text": 42}"#));
        let (status, body) = parse_json::<Body>(wrong).await.unwrap_err();
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body.message.contains("Invalid request body"));
    }
}
