//! Token authentication extractor.
//!
//! When `[server] auth_token` (or `PARLEY_AUTH_TOKEN`) is set, chat routes
//! require it in the `Authorization` header, either raw or as
//! `Bearer <token>`.

use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::http::HeaderMap;

use crate::http::error::AppError;
use crate::state::AppState;

/// Authenticated request marker. Extracting this validates the token.
pub struct Authenticated;

impl FromRequestParts<AppState> for Authenticated {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        match state.auth_token.as_deref() {
            Some(expected) => verify_token(&parts.headers, expected).map(|_| Authenticated),
            None => Ok(Authenticated),
        }
    }
}

/// Check the `Authorization` header against `expected`.
pub fn verify_token(headers: &HeaderMap, expected: &str) -> Result<(), AppError> {
    let header = headers.get(AUTHORIZATION).ok_or_else(|| {
        AppError::Unauthorized(
            "Missing token. Provide it via the 'Authorization' header.".to_string(),
        )
    })?;
    let value = header.to_str().map_err(|_| {
        AppError::Unauthorized("Invalid Authorization header encoding".to_string())
    })?;

    let token = value.strip_prefix("Bearer ").unwrap_or(value).trim();
    if token == expected {
        Ok(())
    } else {
        Err(AppError::Unauthorized("Invalid token".to_string()))
    }
}
