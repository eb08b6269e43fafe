use thiserror::Error;

use crate::llm::LlmError;

/// Errors raised by the chat domain model itself.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChatError {
    #[error("message content must not be empty")]
    InvalidContent,

    #[error("invalid chat configuration: {0}")]
    InvalidConfiguration(String),

    #[error("token budget exceeded: message needs {required} tokens, context holds {capacity}")]
    BudgetExceeded { required: u32, capacity: u32 },

    #[error("chat has ended and accepts no new messages")]
    SessionEnded,
}

/// Errors from repository operations (used by trait definitions in parley-core).
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database connection error")]
    Connection,

    #[error("query error: {0}")]
    Query(String),

    #[error("entity not found")]
    NotFound,

    #[error("conflict: {0}")]
    Conflict(String),
}

/// Errors returned by the sync and streaming completion flows.
#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("cannot start chat: {0}")]
    InvalidConfiguration(#[source] ChatError),

    #[error("message rejected: {0}")]
    MessageRejected(#[source] ChatError),

    #[error("failed to look up chat: {0}")]
    SessionLookupFailed(#[source] RepositoryError),

    #[error("failed to persist chat: {0}")]
    PersistenceError(#[source] RepositoryError),

    #[error("completion failed: {0}")]
    ProviderError(#[source] LlmError),

    #[error("completion stream failed: {0}")]
    ProviderStreamError(#[source] LlmError),

    #[error("completion cancelled")]
    Cancelled,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_budget_exceeded_display() {
        let err = ChatError::BudgetExceeded {
            required: 40,
            capacity: 30,
        };
        assert_eq!(
            err.to_string(),
            "token budget exceeded: message needs 40 tokens, context holds 30"
        );
    }

    #[test]
    fn test_repository_error_display() {
        let err = RepositoryError::Query("syntax error".to_string());
        assert_eq!(err.to_string(), "query error: syntax error");
    }

    #[test]
    fn test_completion_error_wraps_source() {
        use std::error::Error as _;

        let err = CompletionError::SessionLookupFailed(RepositoryError::Connection);
        assert_eq!(
            err.to_string(),
            "failed to look up chat: database connection error"
        );
        assert!(err.source().is_some());
    }
}
