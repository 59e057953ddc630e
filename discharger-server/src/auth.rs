use axum::{
    body::Body,
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, StatusCode},
    middleware::Next,
    response::{IntoResponse, Json, Response},
};
use discharger_core::ErrorBody;
use jsonwebtoken::{jwk::JwkSet, Algorithm, DecodingKey, TokenData, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::{audit, config::JwtSettings, AppState};

/// Caller id used for every request while authentication is disabled
pub const DEV_USER_ID: &str = "dev-user";

/// Cached JWK key set fetched from an external IdP.
#[derive(Default)]
pub struct JwkCache {
    jwks: Option<JwkSet>,
    fetched_at: Option<std::time::Instant>,
}

/// Cache TTL: 15 minutes
const JWK_CACHE_TTL: std::time::Duration = std::time::Duration::from_secs(15 * 60);

impl JwkCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn is_expired(&self) -> bool {
        match self.fetched_at {
            Some(t) => t.elapsed() > JWK_CACHE_TTL,
            None => true,
        }
    }
}

/// Fetch or return cached JWK set from the configured URL.
async fn get_jwks(jwk_url: &str, cache: &RwLock<JwkCache>) -> Result<JwkSet, String> {
    {
        let c = cache.read().await;
        if !c.is_expired()
            && let Some(ref jwks) = c.jwks
        {
            return Ok(jwks.clone());
        }
    }

    let mut c = cache.write().await;
    // Another request may have refreshed while we waited
    if !c.is_expired()
        && let Some(ref jwks) = c.jwks
    {
        return Ok(jwks.clone());
    }

    let response = reqwest::get(jwk_url)
        .await
        .map_err(|e| format!("Failed to fetch JWK from {}: {}", jwk_url, e))?;

    let jwks: JwkSet = response
        .json()
        .await
        .map_err(|e| format!("Failed to parse JWK response: {}", e))?;

    c.jwks = Some(jwks.clone());
    c.fetched_at = Some(std::time::Instant::now());

    Ok(jwks)
}

/// Authenticated caller
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: String,
    pub auth_type: AuthType,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AuthType {
    ApiKey,
    Jwt,
    Disabled,
}

impl AuthUser {
    pub fn new(user_id: impl Into<String>, auth_type: AuthType) -> Self {
        Self {
            user_id: user_id.into(),
            auth_type,
        }
    }
}

impl<S: Send + Sync> FromRequestParts<S> for AuthUser {
    type Rejection = (StatusCode, Json<ErrorBody>);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts.extensions.get::<AuthUser>().cloned().ok_or_else(|| {
            (
                StatusCode::UNAUTHORIZED,
                Json(ErrorBody::unauthorized("Authentication required")),
            )
        })
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct JwtClaims {
    sub: Option<String>,
    iss: Option<String>,
    aud: Option<serde_json::Value>,
    exp: Option<u64>,
    iat: Option<u64>,
}

fn unauthorized(message: impl Into<String>) -> Response {
    (StatusCode::UNAUTHORIZED, Json(ErrorBody::unauthorized(message))).into_response()
}

fn server_error(message: impl Into<String>) -> Response {
    let message = message.into();
    tracing::error!(error = %message, "Authentication backend failure");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorBody::internal("Authentication is misconfigured")),
    )
        .into_response()
}

/// Routes reachable without a caller identity
pub fn is_public_path(path: &str) -> bool {
    path == "/health" || path.starts_with("/public/")
}

/// Authentication middleware
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, Response> {
    if is_public_path(request.uri().path()) {
        return Ok(next.run(request).await);
    }

    if !state.config.auth.enabled {
        request
            .extensions_mut()
            .insert(AuthUser::new(DEV_USER_ID, AuthType::Disabled));
        return Ok(next.run(request).await);
    }

    let client_ip = audit::client_ip(request.extensions());

    let auth_header = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok());

    let Some(auth_header) = auth_header else {
        audit::log_auth_attempt(&client_ip, None, false);
        return Err(unauthorized("Missing Authorization header"));
    };

    let Some(token) = auth_header.strip_prefix("Bearer ") else {
        audit::log_auth_attempt(&client_ip, None, false);
        return Err(unauthorized(
            "Invalid Authorization header format. Use 'Bearer <token>'",
        ));
    };

    let auth_user = match authenticate_bearer(&state, token.trim()).await {
        Ok(user) => user,
        Err(response) => {
            audit::log_auth_attempt(&client_ip, None, false);
            return Err(response);
        }
    };

    audit::log_auth_attempt(&client_ip, Some(&auth_user.user_id), true);
    request.extensions_mut().insert(auth_user);

    Ok(next.run(request).await)
}

/// Authenticate a bearer token (API key first, then JWT fallback)
#[allow(clippy::result_large_err)]
async fn authenticate_bearer(state: &AppState, token: &str) -> Result<AuthUser, Response> {
    for api_key in &state.config.auth.api_keys {
        if api_key.key == token {
            return Ok(AuthUser::new(api_key.name.clone(), AuthType::ApiKey));
        }
    }

    if let Some(ref jwt_settings) = state.config.auth.jwt {
        return authenticate_jwt(jwt_settings, token, &state.jwk_cache).await;
    }

    Err(unauthorized("Invalid API key"))
}

/// Authenticate using a JWT issued by the identity provider
#[allow(clippy::result_large_err)]
async fn authenticate_jwt(
    jwt_settings: &JwtSettings,
    token: &str,
    jwk_cache: &RwLock<JwkCache>,
) -> Result<AuthUser, Response> {
    let (decoding_key, algorithm) = if let Some(ref jwk_url) = jwt_settings.jwk_url {
        let jwks = get_jwks(jwk_url, jwk_cache).await.map_err(server_error)?;

        let header = jsonwebtoken::decode_header(token)
            .map_err(|e| unauthorized(format!("Invalid JWT header: {}", e)))?;

        let kid = header.kid.as_deref().unwrap_or("");
        let jwk = jwks
            .keys
            .iter()
            .find(|k| k.common.key_id.as_deref() == Some(kid))
            .or_else(|| jwks.keys.first())
            .ok_or_else(|| unauthorized("No matching JWK found"))?;

        let key =
            DecodingKey::from_jwk(jwk).map_err(|e| unauthorized(format!("Invalid JWK: {}", e)))?;

        let alg = jwk
            .common
            .key_algorithm
            .and_then(|a| match a {
                jsonwebtoken::jwk::KeyAlgorithm::RS256 => Some(Algorithm::RS256),
                jsonwebtoken::jwk::KeyAlgorithm::RS384 => Some(Algorithm::RS384),
                jsonwebtoken::jwk::KeyAlgorithm::RS512 => Some(Algorithm::RS512),
                jsonwebtoken::jwk::KeyAlgorithm::ES256 => Some(Algorithm::ES256),
                jsonwebtoken::jwk::KeyAlgorithm::ES384 => Some(Algorithm::ES384),
                _ => None,
            })
            .unwrap_or(Algorithm::RS256);

        (key, alg)
    } else if let Some(ref secret) = jwt_settings.secret {
        (DecodingKey::from_secret(secret.as_bytes()), Algorithm::HS256)
    } else if let Some(ref key_file) = jwt_settings.public_key_file {
        let pem = std::fs::read(key_file)
            .map_err(|e| server_error(format!("Failed to read public key file: {}", e)))?;
        let key = DecodingKey::from_rsa_pem(&pem)
            .map_err(|e| server_error(format!("Invalid public key: {}", e)))?;
        (key, Algorithm::RS256)
    } else {
        return Err(server_error(
            "JWT is configured but no secret, public_key_file, or jwk_url is set",
        ));
    };

    let mut validation = Validation::new(algorithm);

    if let Some(ref issuer) = jwt_settings.issuer {
        validation.set_issuer(&[issuer]);
    }

    if let Some(ref audience) = jwt_settings.audience {
        validation.set_audience(&[audience]);
    } else {
        validation.validate_aud = false;
    }

    let token_data: TokenData<JwtClaims> = jsonwebtoken::decode(token, &decoding_key, &validation)
        .map_err(|e| unauthorized(format!("Invalid JWT: {}", e)))?;

    // Every record is owned by the subject, so a token without one is useless
    let user_id = token_data
        .claims
        .sub
        .filter(|s| !s.is_empty())
        .ok_or_else(|| unauthorized("JWT has no subject"))?;

    Ok(AuthUser::new(user_id, AuthType::Jwt))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ApiKey, AuthSettings, ServerConfig};
    use crate::sms::RecordingSms;
    use discharger_core::MockLlmClient;
    use serde_json::json;

    const SECRET: &str = "super-secret-key-for-testing-only-1234567890";

    fn test_config() -> ServerConfig {
        let mut config = ServerConfig::default();
        config.auth = AuthSettings {
            enabled: true,
            api_keys: vec![ApiKey {
                name: "ward-integration".to_string(),
                key: "test-api-key-12345".to_string(),
            }],
            jwt: None,
        };
        config
    }

    fn test_config_with_jwt() -> ServerConfig {
        let mut config = test_config();
        config.auth.jwt = Some(JwtSettings {
            issuer: Some("test-issuer".to_string()),
            audience: Some("test-audience".to_string()),
            secret: Some(SECRET.to_string()),
            public_key_file: None,
            jwk_url: None,
        });
        config
    }

    /// AppState over a temp data dir; keep the dir alive for the test's duration
    fn test_app_state(mut config: ServerConfig) -> (AppState, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        config.storage.data_dir = dir.path().to_path_buf();
        let state = AppState::open(
            config,
            Arc::new(MockLlmClient::new(json!({ "blocks": [] }))),
            Arc::new(RecordingSms::new()),
        )
        .unwrap();
        (state, dir)
    }

    fn create_test_jwt(sub: Option<&str>, issuer: &str, audience: &str) -> String {
        use jsonwebtoken::{encode, EncodingKey, Header};

        let mut claims = json!({
            "iss": issuer,
            "aud": audience,
            "exp": chrono::Utc::now().timestamp() as u64 + 3600,
            "iat": chrono::Utc::now().timestamp() as u64,
        });
        if let Some(sub) = sub {
            claims["sub"] = json!(sub);
        }

        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap()
    }

    #[test]
    fn test_public_paths() {
        assert!(is_public_path("/health"));
        assert!(is_public_path("/public/summary"));
        assert!(!is_public_path("/api/summaries"));
        assert!(!is_public_path("/publicity"));
    }

    #[tokio::test]
    async fn test_authenticate_api_key_valid() {
        let (state, _dir) = test_app_state(test_config());
        let auth_user = authenticate_bearer(&state, "test-api-key-12345").await.unwrap();
        assert_eq!(auth_user.user_id, "ward-integration");
        assert_eq!(auth_user.auth_type, AuthType::ApiKey);
    }

    #[tokio::test]
    async fn test_authenticate_api_key_invalid() {
        let (state, _dir) = test_app_state(test_config());
        assert!(authenticate_bearer(&state, "invalid-key").await.is_err());
    }

    #[tokio::test]
    async fn test_jwt_subject_becomes_user_id() {
        let (state, _dir) = test_app_state(test_config_with_jwt());
        let token = create_test_jwt(Some("dr-rivera"), "test-issuer", "test-audience");
        let auth_user = authenticate_bearer(&state, &token).await.unwrap();
        assert_eq!(auth_user.user_id, "dr-rivera");
        assert_eq!(auth_user.auth_type, AuthType::Jwt);
    }

    #[tokio::test]
    async fn test_jwt_without_subject_is_rejected() {
        let (state, _dir) = test_app_state(test_config_with_jwt());
        let token = create_test_jwt(None, "test-issuer", "test-audience");
        let response = authenticate_bearer(&state, &token).await.unwrap_err();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_jwt_invalid_token() {
        let (state, _dir) = test_app_state(test_config_with_jwt());
        assert!(authenticate_bearer(&state, "not-a-valid-jwt").await.is_err());
    }

    #[tokio::test]
    async fn test_jwt_wrong_issuer_or_audience() {
        let (state, _dir) = test_app_state(test_config_with_jwt());
        let token = create_test_jwt(Some("u1"), "wrong-issuer", "test-audience");
        assert!(authenticate_bearer(&state, &token).await.is_err());
        let token = create_test_jwt(Some("u1"), "test-issuer", "wrong-audience");
        assert!(authenticate_bearer(&state, &token).await.is_err());
    }

    #[tokio::test]
    async fn test_api_key_takes_priority_over_jwt() {
        let (state, _dir) = test_app_state(test_config_with_jwt());
        let auth_user = authenticate_bearer(&state, "test-api-key-12345").await.unwrap();
        assert_eq!(auth_user.auth_type, AuthType::ApiKey);
    }

    #[tokio::test]
    async fn test_jwt_without_key_material_is_server_error() {
        let mut config = test_config();
        config.auth.jwt = Some(JwtSettings {
            issuer: None,
            audience: None,
            secret: None,
            public_key_file: None,
            jwk_url: None,
        });
        let (state, _dir) = test_app_state(config);
        let response = authenticate_bearer(&state, "some.jwt.token").await.unwrap_err();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
