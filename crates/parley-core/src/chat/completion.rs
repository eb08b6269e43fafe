//! Blocking completion flow: one provider call, one reply.

use tokio_util::sync::CancellationToken;
use tracing::warn;

use parley_types::chat::{CompletionInput, CompletionOutput};
use parley_types::error::CompletionError;

use super::repository::ChatRepository;
use super::service::{completion_request, ChatService};

impl<R: ChatRepository> ChatService<R> {
    /// Run one turn and return the assistant's full reply.
    ///
    /// Nothing is saved when the provider fails or the turn is cancelled.
    #[tracing::instrument(
        name = "chat_complete",
        skip(self, input, cancel),
        fields(
            chat_id = ?input.chat_id,
            user_id = %input.user_id,
        )
    )]
    pub async fn complete(
        &self,
        input: CompletionInput,
        cancel: CancellationToken,
    ) -> Result<CompletionOutput, CompletionError> {
        let turn = self.begin_turn(&input, &cancel).await?;
        let request = completion_request(&turn.session, false);

        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(CompletionError::Cancelled),
            response = self.provider().complete(&request) => response,
        };
        let response = response.map_err(|e| {
            warn!(chat_id = %turn.session.id(), error = %e, "Provider completion failed");
            CompletionError::ProviderError(e)
        })?;

        self.finish_turn(turn, response.content).await
    }
}
