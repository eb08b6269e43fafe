//! Application error type mapping to HTTP status codes and a JSON error body.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use parley_types::error::{ChatError, CompletionError};
use parley_types::llm::LlmError;

/// Application-level error that maps to HTTP responses.
#[derive(Debug)]
pub enum AppError {
    /// A completion turn failed.
    Completion(CompletionError),
    /// Authentication failure.
    Unauthorized(String),
    /// Malformed request.
    Validation(String),
    /// Generic internal error.
    Internal(String),
}

impl From<CompletionError> for AppError {
    fn from(e: CompletionError) -> Self {
        AppError::Completion(e)
    }
}

impl AppError {
    /// Status, machine-readable code and message for this error.
    pub fn parts(&self) -> (StatusCode, &'static str, String) {
        match self {
            AppError::Completion(e) => completion_parts(e),
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg.clone()),
            AppError::Validation(msg) => {
                (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone())
            }
            AppError::Internal(msg) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", msg.clone())
            }
        }
    }

    /// The `{ "errors": [...] }` body.
    pub fn body(&self) -> serde_json::Value {
        let (_, code, message) = self.parts();
        json!({
            "errors": [{
                "code": code,
                "message": message,
            }]
        })
    }
}

fn completion_parts(err: &CompletionError) -> (StatusCode, &'static str, String) {
    let message = err.to_string();
    match err {
        CompletionError::InvalidConfiguration(_) => {
            (StatusCode::BAD_REQUEST, "INVALID_CONFIGURATION", message)
        }
        CompletionError::MessageRejected(ChatError::BudgetExceeded { .. }) => {
            (StatusCode::PAYLOAD_TOO_LARGE, "MESSAGE_TOO_LARGE", message)
        }
        CompletionError::MessageRejected(ChatError::SessionEnded) => {
            (StatusCode::CONFLICT, "CHAT_ENDED", message)
        }
        CompletionError::MessageRejected(_) => {
            (StatusCode::UNPROCESSABLE_ENTITY, "MESSAGE_REJECTED", message)
        }
        CompletionError::SessionLookupFailed(_) => {
            (StatusCode::INTERNAL_SERVER_ERROR, "SESSION_LOOKUP_FAILED", message)
        }
        CompletionError::PersistenceError(_) => {
            (StatusCode::INTERNAL_SERVER_ERROR, "PERSISTENCE_ERROR", message)
        }
        CompletionError::ProviderError(LlmError::RateLimited { .. })
        | CompletionError::ProviderStreamError(LlmError::RateLimited { .. }) => {
            (StatusCode::TOO_MANY_REQUESTS, "PROVIDER_RATE_LIMITED", message)
        }
        CompletionError::ProviderError(_) | CompletionError::ProviderStreamError(_) => {
            (StatusCode::BAD_GATEWAY, "PROVIDER_ERROR", message)
        }
        CompletionError::Cancelled => (StatusCode::SERVICE_UNAVAILABLE, "CANCELLED", message),
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, _, _) = self.parts();
        (
            status,
            [(axum::http::header::CONTENT_TYPE, "application/json")],
            self.body().to_string(),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_types::error::RepositoryError;

    #[test]
    fn test_completion_error_status_codes() {
        let cases = [
            (
                CompletionError::InvalidConfiguration(ChatError::InvalidConfiguration(
                    "bad".to_string(),
                )),
                StatusCode::BAD_REQUEST,
            ),
            (
                CompletionError::MessageRejected(ChatError::InvalidContent),
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (
                CompletionError::MessageRejected(ChatError::BudgetExceeded {
                    required: 10,
                    capacity: 5,
                }),
                StatusCode::PAYLOAD_TOO_LARGE,
            ),
            (
                CompletionError::MessageRejected(ChatError::SessionEnded),
                StatusCode::CONFLICT,
            ),
            (
                CompletionError::SessionLookupFailed(RepositoryError::Connection),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                CompletionError::ProviderError(LlmError::RateLimited {
                    retry_after_ms: None,
                }),
                StatusCode::TOO_MANY_REQUESTS,
            ),
            (
                CompletionError::ProviderStreamError(LlmError::Stream("reset".to_string())),
                StatusCode::BAD_GATEWAY,
            ),
        ];

        for (err, status) in cases {
            assert_eq!(AppError::from(err).into_response().status(), status);
        }
    }

    #[test]
    fn test_error_body_shape() {
        let body = AppError::Unauthorized("nope".to_string()).body();
        assert_eq!(body["errors"][0]["code"], "UNAUTHORIZED");
        assert_eq!(body["errors"][0]["message"], "nope");
    }
}
