//! Streaming completion flow.
//!
//! Every text delta is appended to a running buffer and the whole buffer
//! is sent to the caller's sink, so each emission extends the previous
//! one. The next delta is not polled until the sink accepts the send.

use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use parley_types::chat::{CompletionInput, CompletionOutput};
use parley_types::error::CompletionError;
use parley_types::llm::{LlmError, StreamEvent};

use super::repository::ChatRepository;
use super::service::{completion_request, ChatService};

impl<R: ChatRepository> ChatService<R> {
    /// Run one turn, emitting the cumulative reply on `sink` after every
    /// delta. Returns the final output once the session is saved.
    ///
    /// A provider error, a stream that ends without `Done`, or
    /// cancellation (including a dropped sink receiver) leaves the
    /// session unsaved. Emissions already sent are not retracted.
    #[tracing::instrument(
        name = "chat_complete_stream",
        skip(self, input, sink, cancel),
        fields(
            chat_id = ?input.chat_id,
            user_id = %input.user_id,
        )
    )]
    pub async fn complete_stream(
        &self,
        input: CompletionInput,
        sink: mpsc::Sender<CompletionOutput>,
        cancel: CancellationToken,
    ) -> Result<CompletionOutput, CompletionError> {
        let turn = self.begin_turn(&input, &cancel).await?;
        let chat_id = turn.session.id();
        let user_id = turn.user_id.clone();

        let mut stream = self.provider().stream(completion_request(&turn.session, true));
        let mut content = String::new();
        let mut deltas = 0usize;

        loop {
            let event = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!(chat_id = %chat_id, deltas, "Streaming turn cancelled");
                    return Err(CompletionError::Cancelled);
                }
                event = stream.next() => event,
            };

            match event {
                Some(Ok(StreamEvent::TextDelta { text })) => {
                    content.push_str(&text);
                    deltas += 1;

                    let emission = CompletionOutput {
                        chat_id,
                        user_id: user_id.clone(),
                        content: content.clone(),
                    };
                    let sent = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return Err(CompletionError::Cancelled),
                        sent = sink.send(emission) => sent,
                    };
                    if sent.is_err() {
                        debug!(chat_id = %chat_id, deltas, "Stream receiver dropped");
                        return Err(CompletionError::Cancelled);
                    }
                }
                Some(Ok(StreamEvent::Done)) => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!(chat_id = %chat_id, deltas, error = %e, "Provider stream failed");
                    return Err(CompletionError::ProviderStreamError(e));
                }
                None => {
                    warn!(chat_id = %chat_id, deltas, "Provider stream closed without completing");
                    return Err(CompletionError::ProviderStreamError(LlmError::Stream(
                        "stream closed before completion".to_string(),
                    )));
                }
            }
        }

        debug!(chat_id = %chat_id, deltas, "Provider stream completed");
        self.finish_turn(turn, content).await
    }
}
