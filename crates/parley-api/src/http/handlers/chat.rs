//! Chat completion endpoints.
//!
//! - `POST /chat` runs one turn and returns the full reply.
//! - `POST /chat/stream` runs one turn and relays it as Server-Sent Events.
//!
//! SSE event types:
//! - `message` cumulative reply so far: `{ "chat_id", "user_id", "content" }`
//! - `done` turn saved, final output: `{ "chat_id", "user_id", "content" }`
//! - `error` turn failed: `{ "errors": [{ "code", "message" }] }`
//!
//! Dropping the SSE connection cancels the turn; nothing is saved.

use std::convert::Infallible;
use std::time::Duration;

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::Json;
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_stream::Stream;
use uuid::Uuid;

use parley_types::chat::{CompletionInput, CompletionOutput};
use parley_types::error::CompletionError;

use crate::http::error::AppError;
use crate::http::extractors::auth::Authenticated;
use crate::state::AppState;

/// Emissions buffered between the turn and the SSE writer.
const STREAM_BUFFER: usize = 32;

/// Request body for both chat endpoints.
#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    /// Chat to continue; a new chat is started when absent or unknown.
    #[serde(default)]
    pub chat_id: Option<Uuid>,
    pub user_id: String,
    pub message: String,
}

impl ChatRequest {
    /// Stamp the server's chat configuration onto the request.
    fn into_input(self, state: &AppState) -> Result<CompletionInput, AppError> {
        if self.user_id.trim().is_empty() {
            return Err(AppError::Validation("user_id must not be empty".to_string()));
        }
        Ok(CompletionInput {
            chat_id: self.chat_id,
            user_id: self.user_id,
            user_message: self.message,
            configuration: (*state.chat_defaults).clone(),
        })
    }
}

/// POST /chat - blocking completion.
pub async fn chat(
    State(state): State<AppState>,
    _auth: Authenticated,
    Json(body): Json<ChatRequest>,
) -> Result<Json<CompletionOutput>, AppError> {
    let input = body.into_input(&state)?;
    let output = state
        .chat_service
        .complete(input, state.shutdown.child_token())
        .await?;
    Ok(Json(output))
}

/// POST /chat/stream - SSE streaming completion.
pub async fn stream_chat(
    State(state): State<AppState>,
    _auth: Authenticated,
    Json(body): Json<ChatRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    let input = body.into_input(&state)?;

    let (tx, mut rx) = mpsc::channel::<CompletionOutput>(STREAM_BUFFER);
    let cancel = state.shutdown.child_token();
    // Cancels the turn when the SSE stream is dropped, i.e. the client left.
    let disconnect_guard = cancel.clone().drop_guard();

    let chat_service = state.chat_service.clone();
    let turn = tokio::spawn(async move { chat_service.complete_stream(input, tx, cancel).await });

    let sse_stream = async_stream::stream! {
        let _disconnect_guard = disconnect_guard;

        while let Some(emission) = rx.recv().await {
            yield Ok::<_, Infallible>(output_event("message", &emission));
        }

        let result = turn
            .await
            .map_err(|e| AppError::Internal(format!("completion task failed: {e}")))
            .and_then(|result| result.map_err(AppError::from));

        match result {
            Ok(output) => yield Ok(output_event("done", &output)),
            Err(err) => {
                if !matches!(err, AppError::Completion(CompletionError::Cancelled)) {
                    tracing::warn!(error = ?err, "Streaming chat turn failed");
                }
                yield Ok(Event::default().event("error").data(err.body().to_string()));
            }
        }
    };

    Ok(Sse::new(sse_stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15))))
}

fn output_event(name: &str, output: &CompletionOutput) -> Event {
    let data = serde_json::to_string(output).unwrap_or_default();
    Event::default().event(name).data(data)
}
