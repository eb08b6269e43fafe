//! Chat service shared by the blocking and streaming completion flows.
//!
//! A turn runs in four steps: lock and resolve the session, append the
//! user's message, ask the provider, then append the assistant's message
//! and save. The provider step differs between `complete` (see
//! `completion.rs`) and `complete_stream` (see `streaming.rs`); the
//! bookends live here.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use parley_types::chat::{
    ChatConfiguration, ChatMessage, CompletionConfigInput, CompletionInput, CompletionOutput,
    MessageRole,
};
use parley_types::error::{ChatError, CompletionError, RepositoryError};
use parley_types::llm::CompletionRequest;

use super::locks::{SessionGuard, SessionLocks};
use super::repository::ChatRepository;
use super::session::ChatSession;
use crate::llm::box_provider::BoxLlmProvider;
use crate::llm::tokenizer::ModelRegistry;

/// Runs conversational turns against persisted chat sessions.
///
/// Generic over `ChatRepository` so parley-core never depends on
/// parley-infra. The provider is type-erased and picked at startup.
pub struct ChatService<R: ChatRepository> {
    repo: R,
    provider: Arc<BoxLlmProvider>,
    models: Arc<ModelRegistry>,
    locks: SessionLocks,
}

/// A session locked for the duration of one turn, with the user's
/// message already appended.
pub(crate) struct Turn {
    pub(crate) session: ChatSession,
    /// The caller of this turn, reported back in every output.
    pub(crate) user_id: String,
    _guard: SessionGuard,
}

impl<R: ChatRepository> ChatService<R> {
    pub fn new(repo: R, provider: Arc<BoxLlmProvider>, models: Arc<ModelRegistry>) -> Self {
        Self {
            repo,
            provider,
            models,
            locks: SessionLocks::new(),
        }
    }

    pub fn repo(&self) -> &R {
        &self.repo
    }

    pub fn provider(&self) -> &BoxLlmProvider {
        &self.provider
    }

    pub fn models(&self) -> &ModelRegistry {
        &self.models
    }

    /// Resolve the model and copy sampling parameters out of `input`.
    pub fn configuration_for(
        &self,
        input: &CompletionConfigInput,
    ) -> Result<ChatConfiguration, ChatError> {
        let model = self.models.model(&input.model, input.model_max_tokens)?;
        Ok(ChatConfiguration {
            model,
            temperature: input.temperature,
            top_p: input.top_p,
            n: input.n,
            stop: input.stop.clone(),
            max_tokens: input.max_tokens,
            presence_penalty: input.presence_penalty,
            frequency_penalty: input.frequency_penalty,
        })
    }

    /// Lock the chat, load or create it, and append the user's message.
    pub(crate) async fn begin_turn(
        &self,
        input: &CompletionInput,
        cancel: &CancellationToken,
    ) -> Result<Turn, CompletionError> {
        let chat_id = input.chat_id.unwrap_or_else(Uuid::now_v7);

        let guard = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(CompletionError::Cancelled),
            guard = self.locks.acquire(chat_id) => guard,
        };

        let mut session = self.resolve_session(input, chat_id).await?;

        let user_message = ChatMessage::new(
            MessageRole::User,
            input.user_message.as_str(),
            &session.configuration().model,
        )
        .map_err(CompletionError::MessageRejected)?;
        session
            .add_message(user_message)
            .map_err(CompletionError::MessageRejected)?;

        Ok(Turn {
            session,
            user_id: input.user_id.clone(),
            _guard: guard,
        })
    }

    /// Append the assistant's reply, save the whole session, and build the
    /// caller's result.
    pub(crate) async fn finish_turn(
        &self,
        turn: Turn,
        content: String,
    ) -> Result<CompletionOutput, CompletionError> {
        let Turn {
            mut session,
            user_id,
            _guard,
        } = turn;

        let reply = ChatMessage::new(
            MessageRole::Assistant,
            content,
            &session.configuration().model,
        )
        .map_err(CompletionError::MessageRejected)?;
        let content = reply.content().to_string();
        session
            .add_message(reply)
            .map_err(CompletionError::MessageRejected)?;

        if let Err(e) = self.repo.save_session(&session).await {
            warn!(chat_id = %session.id(), error = %e, "Failed to save chat session");
            return Err(CompletionError::PersistenceError(e));
        }

        Ok(CompletionOutput {
            chat_id: session.id(),
            user_id,
            content,
        })
    }

    async fn resolve_session(
        &self,
        input: &CompletionInput,
        chat_id: Uuid,
    ) -> Result<ChatSession, CompletionError> {
        if input.chat_id.is_some() {
            match self.repo.find_session(&chat_id).await {
                Ok(session) => return Ok(session),
                Err(RepositoryError::NotFound) => {}
                Err(e) => {
                    warn!(chat_id = %chat_id, error = %e, "Failed to look up chat session");
                    return Err(CompletionError::SessionLookupFailed(e));
                }
            }
        }

        let configuration = self
            .configuration_for(&input.configuration)
            .map_err(CompletionError::InvalidConfiguration)?;
        let system = ChatMessage::new(
            MessageRole::System,
            input.configuration.initial_system_message.as_str(),
            &configuration.model,
        )
        .map_err(CompletionError::InvalidConfiguration)?;
        let session = ChatSession::with_id(chat_id, input.user_id.as_str(), system, configuration)
            .map_err(CompletionError::InvalidConfiguration)?;

        self.repo.create_session(&session).await.map_err(|e| {
            warn!(chat_id = %chat_id, error = %e, "Failed to create chat session");
            CompletionError::PersistenceError(e)
        })?;
        info!(
            chat_id = %chat_id,
            model = %session.configuration().model.name(),
            "Chat session created"
        );

        Ok(session)
    }
}

/// Build the provider request for the session's active window.
pub(crate) fn completion_request(session: &ChatSession, stream: bool) -> CompletionRequest {
    let config = session.configuration();
    CompletionRequest {
        model: config.model.name().to_string(),
        messages: session.provider_messages(),
        max_tokens: config.max_tokens,
        temperature: Some(config.temperature),
        top_p: Some(config.top_p),
        n: Some(config.n),
        presence_penalty: Some(config.presence_penalty),
        frequency_penalty: Some(config.frequency_penalty),
        stream,
        stop_sequences: (!config.stop.is_empty()).then(|| config.stop.clone()),
    }
}
