//! OpenAI-compatible LLM provider implementation.
//!
//! A single [`OpenAiCompatibleProvider`] serves OpenAI, Gemini, Mistral,
//! Groq and any self-hosted endpoint speaking the chat completions
//! protocol, via a configurable base URL.
//!
//! Uses [`async_openai`] for type-safe request/response handling and
//! built-in SSE streaming.

pub mod config;
pub mod streaming;

use async_openai::config::OpenAIConfig;
use async_openai::types::chat::{
    ChatCompletionRequestAssistantMessage, ChatCompletionRequestAssistantMessageContent,
    ChatCompletionRequestMessage, ChatCompletionRequestSystemMessage,
    ChatCompletionRequestSystemMessageContent, ChatCompletionRequestUserMessage,
    ChatCompletionRequestUserMessageContent, ChatCompletionStreamOptions,
    CreateChatCompletionRequest, CreateChatCompletionResponse, StopConfiguration,
};
use async_openai::Client;
use secrecy::ExposeSecret;

use parley_core::llm::provider::{LlmEventStream, LlmProvider};
use parley_types::llm::{
    CompletionRequest, CompletionResponse, LlmError, Message, MessageRole, StopReason, Usage,
};

use self::config::OpenAiCompatConfig;
use self::streaming::{map_openai_stream, stop_reason};

/// Unified provider for any OpenAI-compatible API.
///
/// Does not derive Debug: the `async_openai::Client` holds the API key.
pub struct OpenAiCompatibleProvider {
    client: Client<OpenAIConfig>,
    provider_name: String,
}

impl OpenAiCompatibleProvider {
    pub fn new(config: OpenAiCompatConfig) -> Self {
        let openai_config = OpenAIConfig::new()
            .with_api_key(config.api_key.expose_secret())
            .with_api_base(&config.base_url);

        Self {
            client: Client::with_config(openai_config),
            provider_name: config.provider_name,
        }
    }

    /// Build a [`CreateChatCompletionRequest`] from a generic [`CompletionRequest`].
    fn build_request(
        &self,
        request: &CompletionRequest,
        stream: bool,
    ) -> Result<CreateChatCompletionRequest, LlmError> {
        if request.model.is_empty() {
            return Err(LlmError::InvalidRequest("model must be set".to_string()));
        }

        let n = request
            .n
            .map(|n| {
                u8::try_from(n)
                    .map_err(|_| LlmError::InvalidRequest(format!("n = {n} is too large")))
            })
            .transpose()?;

        let mut req = CreateChatCompletionRequest {
            model: request.model.clone(),
            messages: request.messages.iter().map(to_openai_message).collect(),
            max_completion_tokens: Some(request.max_tokens),
            temperature: request.temperature,
            top_p: request.top_p,
            n,
            presence_penalty: request.presence_penalty,
            frequency_penalty: request.frequency_penalty,
            ..Default::default()
        };

        if let Some(stops) = request.stop_sequences.as_ref().filter(|s| !s.is_empty()) {
            req.stop = Some(StopConfiguration::StringArray(stops.clone()));
        }

        if stream {
            req.stream = Some(true);
            req.stream_options = Some(ChatCompletionStreamOptions {
                include_usage: Some(true),
                include_obfuscation: None,
            });
        }

        Ok(req)
    }
}

fn to_openai_message(msg: &Message) -> ChatCompletionRequestMessage {
    match msg.role {
        MessageRole::System => {
            ChatCompletionRequestMessage::System(ChatCompletionRequestSystemMessage {
                content: ChatCompletionRequestSystemMessageContent::Text(msg.content.clone()),
                name: None,
            })
        }
        MessageRole::User => {
            ChatCompletionRequestMessage::User(ChatCompletionRequestUserMessage {
                content: ChatCompletionRequestUserMessageContent::Text(msg.content.clone()),
                name: None,
            })
        }
        MessageRole::Assistant => {
            #[allow(deprecated)]
            ChatCompletionRequestMessage::Assistant(ChatCompletionRequestAssistantMessage {
                content: Some(ChatCompletionRequestAssistantMessageContent::Text(
                    msg.content.clone(),
                )),
                refusal: None,
                name: None,
                audio: None,
                tool_calls: None,
                function_call: None,
            })
        }
    }
}

impl LlmProvider for OpenAiCompatibleProvider {
    fn name(&self) -> &str {
        &self.provider_name
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let oai_request = self.build_request(request, false)?;

        let response = self
            .client
            .chat()
            .create(oai_request)
            .await
            .map_err(map_openai_error)?;

        completion_response(response)
    }

    fn stream(&self, request: CompletionRequest) -> LlmEventStream {
        // Build the request. If it fails, return a stream that immediately errors.
        let oai_request = match self.build_request(&request, true) {
            Ok(req) => req,
            Err(e) => {
                return Box::pin(futures_util::stream::once(async move { Err(e) }));
            }
        };

        // Clone the client for the 'static stream
        let client = self.client.clone();

        Box::pin(async_stream::try_stream! {
            let oai_stream = client
                .chat()
                .create_stream(oai_request)
                .await
                .map_err(map_openai_error)?;

            let mut inner = map_openai_stream(oai_stream);

            use futures_util::StreamExt;
            while let Some(event) = inner.next().await {
                yield event?;
            }
        })
    }
}

/// Convert the first choice of a chat completion into a [`CompletionResponse`].
///
/// A reply without text is the provider's failure, not the caller's.
fn completion_response(
    response: CreateChatCompletionResponse,
) -> Result<CompletionResponse, LlmError> {
    let first = response.choices.iter().find(|c| c.index == 0);
    let content = first
        .and_then(|c| c.message.content.clone())
        .filter(|text| !text.is_empty())
        .ok_or_else(|| LlmError::Provider {
            message: format!("response {} contained no text", response.id),
        })?;
    let stop_reason = first
        .and_then(|c| c.finish_reason.as_ref())
        .map(stop_reason)
        .unwrap_or(StopReason::EndTurn);

    let usage = response
        .usage
        .map(|u| Usage {
            input_tokens: u.prompt_tokens,
            output_tokens: u.completion_tokens,
        })
        .unwrap_or_default();

    Ok(CompletionResponse {
        id: response.id,
        content,
        model: response.model,
        stop_reason,
        usage,
    })
}

/// Map an `async_openai::error::OpenAIError` to an [`LlmError`].
fn map_openai_error(err: async_openai::error::OpenAIError) -> LlmError {
    use async_openai::error::OpenAIError;

    match &err {
        OpenAIError::ApiError(api_err) => {
            let code = api_err.code.as_deref().unwrap_or("");
            let error_type = api_err.r#type.as_deref().unwrap_or("");

            if code == "invalid_api_key"
                || error_type == "authentication_error"
                || api_err.message.contains("Incorrect API key")
                || api_err.message.contains("Invalid API key")
            {
                LlmError::AuthenticationFailed
            } else if code == "rate_limit_exceeded" || error_type == "rate_limit_error" {
                LlmError::RateLimited {
                    retry_after_ms: None,
                }
            } else if code == "context_length_exceeded"
                || api_err.message.contains("maximum context length")
            {
                LlmError::ContextLengthExceeded
            } else if code == "server_error" || error_type == "overloaded_error" {
                LlmError::Overloaded(api_err.message.clone())
            } else if error_type == "invalid_request_error" {
                LlmError::InvalidRequest(api_err.message.clone())
            } else {
                LlmError::Provider {
                    message: err.to_string(),
                }
            }
        }
        OpenAIError::Reqwest(reqwest_err) => match reqwest_err.status().map(|s| s.as_u16()) {
            Some(401) => LlmError::AuthenticationFailed,
            Some(429) => LlmError::RateLimited {
                retry_after_ms: None,
            },
            Some(503) | Some(529) => LlmError::Overloaded(err.to_string()),
            _ => LlmError::Provider {
                message: err.to_string(),
            },
        },
        OpenAIError::JSONDeserialize(_, content) => {
            LlmError::Deserialization(format!("failed to parse response: {content}"))
        }
        OpenAIError::StreamError(stream_err) => LlmError::Stream(stream_err.to_string()),
        OpenAIError::InvalidArgument(msg) => LlmError::InvalidRequest(msg.clone()),
        _ => LlmError::Provider {
            message: err.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::SecretString;

    fn provider() -> OpenAiCompatibleProvider {
        OpenAiCompatibleProvider::new(OpenAiCompatConfig {
            provider_name: "openai".to_string(),
            base_url: "https://api.openai.com/v1".to_string(),
            api_key: SecretString::from("sk-test".to_string()),
        })
    }

    fn request(messages: Vec<Message>) -> CompletionRequest {
        CompletionRequest {
            model: "gpt-4o".to_string(),
            messages,
            max_tokens: 1024,
            temperature: Some(0.7),
            top_p: Some(0.9),
            n: Some(1),
            presence_penalty: Some(0.5),
            frequency_penalty: Some(-0.5),
            stream: false,
            stop_sequences: None,
        }
    }

    fn message(role: MessageRole, content: &str) -> Message {
        Message {
            role,
            content: content.to_string(),
        }
    }

    #[test]
    fn test_provider_name() {
        assert_eq!(provider().name(), "openai");
    }

    #[test]
    fn test_build_request_messages_and_sampling() {
        let req = request(vec![
            message(MessageRole::System, "Be helpful"),
            message(MessageRole::User, "Hello"),
            message(MessageRole::Assistant, "Hi there!"),
        ]);

        let oai_req = provider().build_request(&req, false).unwrap();
        assert_eq!(oai_req.model, "gpt-4o");
        assert_eq!(oai_req.messages.len(), 3);
        assert!(matches!(
            oai_req.messages[0],
            ChatCompletionRequestMessage::System(_)
        ));
        assert!(matches!(
            oai_req.messages[2],
            ChatCompletionRequestMessage::Assistant(_)
        ));
        assert_eq!(oai_req.max_completion_tokens, Some(1024));
        assert_eq!(oai_req.temperature, Some(0.7));
        assert_eq!(oai_req.top_p, Some(0.9));
        assert_eq!(oai_req.n, Some(1));
        assert_eq!(oai_req.presence_penalty, Some(0.5));
        assert_eq!(oai_req.frequency_penalty, Some(-0.5));
        assert!(oai_req.stream.is_none());
        assert!(oai_req.stream_options.is_none());
        assert!(oai_req.stop.is_none());
    }

    #[test]
    fn test_build_request_streaming() {
        let oai_req = provider()
            .build_request(&request(vec![message(MessageRole::User, "Hello")]), true)
            .unwrap();
        assert_eq!(oai_req.stream, Some(true));
        let opts = oai_req.stream_options.unwrap();
        assert_eq!(opts.include_usage, Some(true));
    }

    #[test]
    fn test_build_request_stop_sequences() {
        let mut req = request(vec![]);
        req.stop_sequences = Some(vec!["STOP".to_string(), "END".to_string()]);

        let oai_req = provider().build_request(&req, false).unwrap();
        assert!(matches!(
            oai_req.stop,
            Some(StopConfiguration::StringArray(ref stops)) if stops.len() == 2
        ));
    }

    #[test]
    fn test_build_request_rejects_empty_model() {
        let mut req = request(vec![]);
        req.model = String::new();
        assert!(matches!(
            provider().build_request(&req, false),
            Err(LlmError::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_build_request_rejects_oversized_n() {
        let mut req = request(vec![]);
        req.n = Some(1000);
        assert!(matches!(
            provider().build_request(&req, false),
            Err(LlmError::InvalidRequest(_))
        ));
    }

    #[tokio::test]
    async fn test_stream_with_bad_request_errors_first() {
        use futures_util::StreamExt;

        let mut req = request(vec![]);
        req.model = String::new();
        let mut stream = provider().stream(req);
        let first = stream.next().await.unwrap();
        assert!(matches!(first, Err(LlmError::InvalidRequest(_))));
        assert!(stream.next().await.is_none());
    }

    fn response_json(choices: serde_json::Value) -> CreateChatCompletionResponse {
        serde_json::from_value(serde_json::json!({
            "id": "chatcmpl-1",
            "object": "chat.completion",
            "created": 1700000000,
            "model": "gpt-4o",
            "choices": choices,
            "usage": {
                "prompt_tokens": 12,
                "completion_tokens": 3,
                "total_tokens": 15
            }
        }))
        .unwrap()
    }

    #[test]
    fn test_completion_response_uses_first_choice() {
        let response = completion_response(response_json(serde_json::json!([
            {
                "index": 1,
                "message": { "role": "assistant", "content": "second" },
                "finish_reason": "stop"
            },
            {
                "index": 0,
                "message": { "role": "assistant", "content": "Hello there" },
                "finish_reason": "length"
            }
        ])))
        .unwrap();

        assert_eq!(response.content, "Hello there");
        assert_eq!(response.stop_reason, StopReason::MaxTokens);
        assert_eq!(response.usage.input_tokens, 12);
        assert_eq!(response.usage.output_tokens, 3);
    }

    #[test]
    fn test_completion_response_without_text_is_provider_error() {
        let missing = completion_response(response_json(serde_json::json!([
            {
                "index": 0,
                "message": { "role": "assistant", "content": null },
                "finish_reason": "content_filter"
            }
        ])));
        assert!(matches!(missing, Err(LlmError::Provider { .. })));

        let empty = completion_response(response_json(serde_json::json!([
            {
                "index": 0,
                "message": { "role": "assistant", "content": "" },
                "finish_reason": "stop"
            }
        ])));
        assert!(matches!(empty, Err(LlmError::Provider { .. })));

        let no_choices = completion_response(response_json(serde_json::json!([])));
        assert!(matches!(no_choices, Err(LlmError::Provider { .. })));
    }

    #[test]
    fn test_map_openai_error_api_auth() {
        use async_openai::error::{ApiError, OpenAIError};
        let api_err = ApiError {
            message: "Incorrect API key provided".to_string(),
            r#type: Some("authentication_error".to_string()),
            param: None,
            code: None,
        };
        let err = map_openai_error(OpenAIError::ApiError(api_err));
        assert!(matches!(err, LlmError::AuthenticationFailed));
    }

    #[test]
    fn test_map_openai_error_context_length() {
        use async_openai::error::{ApiError, OpenAIError};
        let api_err = ApiError {
            message: "This model's maximum context length is 8192 tokens".to_string(),
            r#type: Some("invalid_request_error".to_string()),
            param: None,
            code: Some("context_length_exceeded".to_string()),
        };
        let err = map_openai_error(OpenAIError::ApiError(api_err));
        assert!(matches!(err, LlmError::ContextLengthExceeded));
    }

    #[test]
    fn test_map_openai_error_rate_limit() {
        use async_openai::error::{ApiError, OpenAIError};
        let api_err = ApiError {
            message: "Rate limit exceeded".to_string(),
            r#type: Some("rate_limit_error".to_string()),
            param: None,
            code: None,
        };
        let err = map_openai_error(OpenAIError::ApiError(api_err));
        assert!(matches!(err, LlmError::RateLimited { .. }));
    }

    #[test]
    fn test_map_openai_error_invalid_argument() {
        use async_openai::error::OpenAIError;
        let err = map_openai_error(OpenAIError::InvalidArgument("bad arg".to_string()));
        assert!(matches!(err, LlmError::InvalidRequest(_)));
    }
}
