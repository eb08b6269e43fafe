//! ChatRepository trait definition.
//!
//! The session store port. Sessions are persisted whole: every save
//! replaces the stored header, active window and archive together.

use parley_types::error::RepositoryError;
use uuid::Uuid;

use super::session::ChatSession;

/// Repository trait for chat session persistence.
///
/// Implementations live in parley-infra (e.g., `SqliteChatRepository`).
/// Uses native async fn in traits (RPITIT, Rust 2024 edition).
pub trait ChatRepository: Send + Sync {
    /// Insert a brand-new session with its initial messages.
    fn create_session(
        &self,
        session: &ChatSession,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Load a session by id.
    ///
    /// Returns [`RepositoryError::NotFound`] when no session has that id.
    /// Each call builds a fresh aggregate.
    fn find_session(
        &self,
        session_id: &Uuid,
    ) -> impl std::future::Future<Output = Result<ChatSession, RepositoryError>> + Send;

    /// Replace the stored session with `session`, all or nothing.
    fn save_session(
        &self,
        session: &ChatSession,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;
}
