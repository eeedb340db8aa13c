use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};
use axum_extra::extract::CookieJar;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use serde::{Deserialize, Serialize};
use tracing::{error, warn};
use uuid::Uuid;

use crate::axum_http::error_responses::AppError;
use domain::value_objects::enrollments::Purchaser;

/// Cookie the storefront keeps the Supabase access token in.
pub const SESSION_COOKIE: &str = "sb-access-token";

/// Signing secret of the Supabase project, installed as a request extension.
#[derive(Clone)]
pub struct SupabaseJwtSecret(pub String);

#[derive(Debug, Serialize, Deserialize)]
pub struct SupabaseClaims {
    pub sub: String,
    #[serde(default)]
    pub aud: Option<String>,
    pub role: String,
    pub email: Option<String>,
    pub exp: usize,
    #[serde(default)]
    pub user_metadata: Option<serde_json::Value>,
}

#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub role: String,
}

impl AuthUser {
    pub fn purchaser(&self) -> Purchaser {
        Purchaser {
            user_id: self.user_id,
            email: self.email.clone(),
            display_name: self.display_name.clone(),
        }
    }
}

#[derive(Debug)]
pub struct AuthError(anyhow::Error);

impl From<anyhow::Error> for AuthError {
    fn from(err: anyhow::Error) -> Self {
        AuthError(err)
    }
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

pub fn validate_supabase_jwt(token: &str, secret: &str) -> Result<SupabaseClaims, AuthError> {
    let decoding_key = DecodingKey::from_secret(secret.as_bytes());
    let mut validation = Validation::new(Algorithm::HS256);
    validation.set_audience(&["authenticated", "service_role"]);

    let token_data = decode::<SupabaseClaims>(token, &decoding_key, &validation)
        .map_err(|e| anyhow::anyhow!("JWT validation failed: {}", e))?;

    Ok(token_data.claims)
}

/// `Authorization: Bearer <jwt>` first, then the session cookie.
fn extract_token(parts: &Parts) -> Result<String, AppError> {
    if let Some(header) = parts.headers.get(AUTHORIZATION) {
        let value = header
            .to_str()
            .map_err(|_| AppError::Unauthorized("Invalid Authorization header".to_string()))?;

        return value
            .strip_prefix("Bearer ")
            .map(|token| token.trim().to_string())
            .filter(|token| !token.is_empty())
            .ok_or_else(|| {
                AppError::Unauthorized("Invalid Authorization header format".to_string())
            });
    }

    CookieJar::from_headers(&parts.headers)
        .get(SESSION_COOKIE)
        .map(|cookie| cookie.value().to_string())
        .filter(|token| !token.is_empty())
        .ok_or_else(|| AppError::Unauthorized("Missing access token".to_string()))
}

fn display_name(claims: &SupabaseClaims) -> Option<String> {
    let metadata = claims.user_metadata.as_ref()?;
    ["full_name", "name"]
        .iter()
        .filter_map(|key| metadata.get(key).and_then(|value| value.as_str()))
        .map(str::trim)
        .find(|name| !name.is_empty())
        .map(str::to_string)
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let Some(SupabaseJwtSecret(secret)) = parts.extensions.get::<SupabaseJwtSecret>().cloned()
        else {
            error!("auth: jwt secret extension is not installed");
            return Err(AppError::Internal(anyhow::anyhow!(
                "jwt secret extension missing"
            )));
        };

        let token = extract_token(parts)?;

        let claims = validate_supabase_jwt(&token, &secret).map_err(|err| {
            warn!(error = %err, "auth: rejected access token");
            AppError::Unauthorized("Invalid access token".to_string())
        })?;

        let user_id = Uuid::parse_str(&claims.sub)
            .map_err(|_| AppError::Unauthorized("Invalid user ID in token".to_string()))?;

        Ok(AuthUser {
            user_id,
            display_name: display_name(&claims),
            email: claims.email,
            role: claims.role,
        })
    }
}
