//! OpenAI SSE stream to [`StreamEvent`] adapter.
//!
//! Maps `async-openai`'s [`ChatCompletionResponseStream`] chunks onto the
//! provider-agnostic [`StreamEvent`] enum defined in `parley-types`.

use futures_util::StreamExt;

use async_openai::types::chat::{ChatCompletionResponseStream, FinishReason};

use parley_core::llm::provider::LlmEventStream;
use parley_types::llm::{LlmError, StopReason, StreamEvent, Usage};

/// Map an async-openai [`ChatCompletionResponseStream`] to [`StreamEvent`]s.
///
/// The returned stream emits events in this order:
/// 1. `Connected` immediately on entry
/// 2. `TextDelta` for each non-empty text chunk of the first choice
/// 3. `MessageDelta` with the stop reason when finish_reason appears
/// 4. `Usage` when the final chunk reports it (`include_usage = true`)
/// 5. `Done` once the SSE stream ends cleanly
///
/// A transport or decoding error ends the stream without `Done`.
pub fn map_openai_stream(stream: ChatCompletionResponseStream) -> LlmEventStream {
    Box::pin(async_stream::try_stream! {
        yield StreamEvent::Connected;

        let mut stream = stream;

        while let Some(result) = stream.next().await {
            let chunk = result.map_err(|e| LlmError::Stream(e.to_string()))?;

            // Only the first choice is relayed; extra choices (n > 1) would
            // interleave into one text.
            for choice in chunk.choices.iter().filter(|c| c.index == 0) {
                if let Some(text) = choice.delta.content.as_ref().filter(|t| !t.is_empty()) {
                    yield StreamEvent::TextDelta { text: text.clone() };
                }

                if let Some(finish_reason) = choice.finish_reason.as_ref() {
                    yield StreamEvent::MessageDelta {
                        stop_reason: stop_reason(finish_reason),
                    };
                }
            }

            // The final chunk carries usage with an empty choices array.
            if let Some(usage) = chunk.usage.as_ref() {
                yield StreamEvent::Usage(Usage {
                    input_tokens: usage.prompt_tokens,
                    output_tokens: usage.completion_tokens,
                });
            }
        }

        yield StreamEvent::Done;
    })
}

/// Map an OpenAI finish reason onto a [`StopReason`].
pub(crate) fn stop_reason(finish_reason: &FinishReason) -> StopReason {
    match finish_reason {
        FinishReason::Stop => StopReason::EndTurn,
        FinishReason::Length => StopReason::MaxTokens,
        FinishReason::ContentFilter => StopReason::ContentFilter,
        FinishReason::ToolCalls | FinishReason::FunctionCall => StopReason::EndTurn,
    }
}
