// =============================================================================
// AUTH MODULE
// =============================================================================
// Bearer token gate in front of every resource route.
//
// Tokens are issued elsewhere; this service only verifies the HS256
// signature and expiry with the shared secret. A request either carries a
// valid `Authorization: Bearer <token>` header or is rejected with 401
// before any handler runs.
// =============================================================================

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{decode, errors::ErrorKind, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};
use crate::AppState;

/// Claims this service reads. Other claims in the token are ignored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<serde_json::Value>,
    /// `"access"` or `"refresh"` when the issuer distinguishes them
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
    pub exp: i64,
}

/// The caller behind a verified token, stored in request extensions.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub subject: String,
}

#[derive(Clone)]
pub struct TokenValidator {
    key: DecodingKey,
    validation: Validation,
}

impl TokenValidator {
    pub fn new(secret: &str) -> Self {
        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::new(Algorithm::HS256),
        }
    }

    pub fn validate(&self, token: &str) -> AppResult<AuthUser> {
        let claims = decode::<Claims>(token, &self.key, &self.validation)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => AppError::Unauthorized("Token has expired".into()),
                _ => AppError::Unauthorized("Token is invalid".into()),
            })?
            .claims;

        if let Some(kind) = claims.token_type.as_deref() {
            if kind != "access" {
                return Err(AppError::Unauthorized(format!(
                    "Token has wrong type: {kind}"
                )));
            }
        }

        let subject = claims
            .sub
            .or_else(|| {
                claims.user_id.map(|id| match id {
                    serde_json::Value::String(s) => s,
                    other => other.to_string(),
                })
            })
            .unwrap_or_default();

        Ok(AuthUser { subject })
    }
}

fn bearer_token(headers: &HeaderMap) -> AppResult<&str> {
    let value = headers
        .get(header::AUTHORIZATION)
        .ok_or_else(|| AppError::Unauthorized("Authentication credentials were not provided".into()))?
        .to_str()
        .map_err(|_| AppError::Unauthorized("Malformed Authorization header".into()))?;

    match value.strip_prefix("Bearer ") {
        Some(token) if !token.trim().is_empty() => Ok(token.trim()),
        _ => Err(AppError::Unauthorized(
            "Authorization header must be 'Bearer <token>'".into(),
        )),
    }
}

/// Middleware: verify the bearer token and attach the `AuthUser`.
pub async fn require_bearer(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let user = state.tokens.validate(bearer_token(request.headers())?)?;
    tracing::debug!(subject = %user.subject, "Request authenticated");

    request.extensions_mut().insert(user);
    Ok(next.run(request).await)
}
