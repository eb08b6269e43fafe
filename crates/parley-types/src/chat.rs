//! Chat message, configuration, and completion input/output types for Parley.
//!
//! These types model a conversation between a user and an LLM: the
//! messages exchanged, the sampling configuration a chat is bound to, and
//! the request/response shapes consumed by the completion flows.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use std::fmt;
use std::str::FromStr;

use crate::error::ChatError;
use crate::model::Model;

// Re-export MessageRole from llm module (it's used in both chat and llm contexts).
pub use crate::llm::MessageRole;

/// Lifecycle status of a chat session.
///
/// Maps to the CHECK constraint in the SQLite schema:
/// `CHECK (status IN ('active', 'ended'))`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    #[default]
    Active,
    Ended,
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionStatus::Active => write!(f, "active"),
            SessionStatus::Ended => write!(f, "ended"),
        }
    }
}

impl FromStr for SessionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "active" => Ok(SessionStatus::Active),
            "ended" => Ok(SessionStatus::Ended),
            other => Err(format!("invalid session status: '{other}'")),
        }
    }
}

/// A single turn within a chat.
///
/// Fields are private so the token count can never drift from the content:
/// messages are built with [`ChatMessage::new`] (which counts tokens under
/// the owning model) or rebuilt from storage with [`ChatMessage::restore`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    id: Uuid,
    role: MessageRole,
    content: String,
    token_count: u32,
    model: String,
    created_at: DateTime<Utc>,
}

impl ChatMessage {
    /// Create a new message, counting its tokens with `model`'s tokenizer.
    ///
    /// Fails with [`ChatError::InvalidContent`] when `content` is empty.
    pub fn new(
        role: MessageRole,
        content: impl Into<String>,
        model: &Model,
    ) -> Result<Self, ChatError> {
        let content = content.into();
        if content.is_empty() {
            return Err(ChatError::InvalidContent);
        }

        Ok(Self {
            id: Uuid::now_v7(),
            role,
            token_count: model.token_count(&content),
            content,
            model: model.name().to_string(),
            created_at: Utc::now(),
        })
    }

    /// Rebuild a previously persisted message without recounting tokens.
    pub fn restore(
        id: Uuid,
        role: MessageRole,
        content: String,
        token_count: u32,
        model: String,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            role,
            content,
            token_count,
            model,
            created_at,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn role(&self) -> &MessageRole {
        &self.role
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn token_count(&self) -> u32 {
        self.token_count
    }

    /// Name of the model whose tokenizer produced `token_count`.
    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn is_system(&self) -> bool {
        self.role == MessageRole::System
    }
}

/// Sampling parameters a chat is bound to for its whole lifetime.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatConfiguration {
    pub model: Model,
    pub temperature: f32,
    pub top_p: f32,
    /// Number of completions to request per turn.
    pub n: u32,
    pub stop: Vec<String>,
    /// Output budget reserved for every provider response.
    pub max_tokens: u32,
    pub presence_penalty: f32,
    pub frequency_penalty: f32,
}

impl ChatConfiguration {
    /// Check every parameter against its documented range.
    pub fn validate(&self) -> Result<(), ChatError> {
        let invalid = |msg: String| Err(ChatError::InvalidConfiguration(msg));

        if self.max_tokens == 0 {
            return invalid("max_tokens must be positive".to_string());
        }
        if self.max_tokens >= self.model.capacity() {
            return invalid(format!(
                "max_tokens {} leaves no room in the {}-token context of '{}'",
                self.max_tokens,
                self.model.capacity(),
                self.model.name()
            ));
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return invalid(format!("temperature {} outside [0, 2]", self.temperature));
        }
        if !(0.0..=1.0).contains(&self.top_p) {
            return invalid(format!("top_p {} outside [0, 1]", self.top_p));
        }
        if self.n == 0 {
            return invalid("n must be at least 1".to_string());
        }
        if !(-2.0..=2.0).contains(&self.presence_penalty) {
            return invalid(format!(
                "presence_penalty {} outside [-2, 2]",
                self.presence_penalty
            ));
        }
        if !(-2.0..=2.0).contains(&self.frequency_penalty) {
            return invalid(format!(
                "frequency_penalty {} outside [-2, 2]",
                self.frequency_penalty
            ));
        }

        Ok(())
    }
}

/// Chat configuration as supplied by a caller, before the model is resolved.
///
/// The initial system message is only used when a turn creates a new chat.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompletionConfigInput {
    pub model: String,
    /// Context capacity of `model` in tokens.
    pub model_max_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
    pub n: u32,
    pub stop: Vec<String>,
    pub max_tokens: u32,
    pub presence_penalty: f32,
    pub frequency_penalty: f32,
    pub initial_system_message: String,
}

impl Default for CompletionConfigInput {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            model_max_tokens: 128_000,
            temperature: 1.0,
            top_p: 1.0,
            n: 1,
            stop: Vec::new(),
            max_tokens: 1024,
            presence_penalty: 0.0,
            frequency_penalty: 0.0,
            initial_system_message: "You are a helpful assistant.".to_string(),
        }
    }
}

/// One conversational turn requested by a caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionInput {
    /// Chat to continue; a new chat is started when absent or unknown.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chat_id: Option<Uuid>,
    pub user_id: String,
    pub user_message: String,
    #[serde(default)]
    pub configuration: CompletionConfigInput,
}

/// Result of a completion turn.
///
/// The streaming flow emits this repeatedly, each time with the full text
/// accumulated so far.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionOutput {
    pub chat_id: Uuid,
    pub user_id: String,
    pub content: String,
}
