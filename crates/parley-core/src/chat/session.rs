//! The chat session aggregate and its token-budget state machine.
//!
//! A session owns an ordered active window (sent to the provider every
//! turn) and an append-only archive of messages evicted to keep
//! `token_usage + max_tokens <= capacity`. Leading system messages are
//! pinned and never evicted.

use chrono::{DateTime, Utc};
use tracing::debug;
use uuid::Uuid;

use parley_types::chat::{ChatConfiguration, ChatMessage, MessageRole, SessionStatus};
use parley_types::error::ChatError;
use parley_types::llm::Message;

/// A multi-turn conversation between one user and one model.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatSession {
    id: Uuid,
    user_id: String,
    status: SessionStatus,
    configuration: ChatConfiguration,
    messages: Vec<ChatMessage>,
    erased_messages: Vec<ChatMessage>,
    token_usage: u32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

/// Stored state handed to [`ChatSession::restore`].
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub id: Uuid,
    pub user_id: String,
    pub status: SessionStatus,
    pub configuration: ChatConfiguration,
    pub messages: Vec<ChatMessage>,
    pub erased_messages: Vec<ChatMessage>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ChatSession {
    /// Start a chat with a fresh id whose active window is exactly
    /// `[initial_system_message]`.
    pub fn new(
        user_id: impl Into<String>,
        initial_system_message: ChatMessage,
        configuration: ChatConfiguration,
    ) -> Result<Self, ChatError> {
        Self::with_id(
            Uuid::now_v7(),
            user_id,
            initial_system_message,
            configuration,
        )
    }

    /// Start a chat under a caller-chosen id.
    pub fn with_id(
        id: Uuid,
        user_id: impl Into<String>,
        initial_system_message: ChatMessage,
        configuration: ChatConfiguration,
    ) -> Result<Self, ChatError> {
        configuration.validate()?;
        if initial_system_message.role() != &MessageRole::System {
            return Err(ChatError::InvalidConfiguration(format!(
                "initial message must have the system role, got '{}'",
                initial_system_message.role()
            )));
        }

        let now = Utc::now();
        let mut session = Self {
            id,
            user_id: user_id.into(),
            status: SessionStatus::Active,
            configuration,
            messages: Vec::new(),
            erased_messages: Vec::new(),
            token_usage: 0,
            created_at: now,
            updated_at: now,
        };
        session.add_message(initial_system_message)?;
        Ok(session)
    }

    /// Rebuild a session from storage.
    ///
    /// Token usage is recomputed from the active window; a snapshot that
    /// breaks the budget is rejected rather than silently repaired.
    pub fn restore(snapshot: SessionSnapshot) -> Result<Self, ChatError> {
        let usage: u64 = snapshot
            .messages
            .iter()
            .map(|m| u64::from(m.token_count()))
            .sum();
        let required = usage + u64::from(snapshot.configuration.max_tokens);
        let capacity = snapshot.configuration.model.capacity();
        if required > u64::from(capacity) {
            return Err(ChatError::BudgetExceeded {
                required: saturate(required),
                capacity,
            });
        }

        Ok(Self {
            id: snapshot.id,
            user_id: snapshot.user_id,
            status: snapshot.status,
            configuration: snapshot.configuration,
            messages: snapshot.messages,
            erased_messages: snapshot.erased_messages,
            token_usage: saturate(usage),
            created_at: snapshot.created_at,
            updated_at: snapshot.updated_at,
        })
    }

    /// Append `message` to the active window, archiving the oldest
    /// non-system messages until the budget holds again.
    ///
    /// Fails with [`ChatError::BudgetExceeded`] when the message cannot fit
    /// even after every evictable message is gone, and with
    /// [`ChatError::SessionEnded`] once the chat is ended. The session is
    /// left untouched in both cases.
    pub fn add_message(&mut self, message: ChatMessage) -> Result<(), ChatError> {
        if self.status == SessionStatus::Ended {
            return Err(ChatError::SessionEnded);
        }

        let capacity = u64::from(self.configuration.model.capacity());
        let reserve = u64::from(self.configuration.max_tokens);
        let mut usage = u64::from(self.token_usage) + u64::from(message.token_count());

        // Plan evictions before touching any state.
        let mut evict = 0usize;
        for existing in &self.messages {
            if usage + reserve <= capacity {
                break;
            }
            if existing.is_system() {
                continue;
            }
            usage -= u64::from(existing.token_count());
            evict += 1;
        }

        if usage + reserve > capacity {
            return Err(ChatError::BudgetExceeded {
                required: saturate(usage + reserve),
                capacity: saturate(capacity),
            });
        }

        if evict > 0 {
            let mut kept = Vec::with_capacity(self.messages.len() - evict + 1);
            let mut remaining = evict;
            for existing in self.messages.drain(..) {
                if remaining > 0 && !existing.is_system() {
                    remaining -= 1;
                    self.erased_messages.push(existing);
                } else {
                    kept.push(existing);
                }
            }
            self.messages = kept;
            debug!(
                chat_id = %self.id,
                evicted = evict,
                usage,
                "Archived messages to stay within token budget"
            );
        }

        self.messages.push(message);
        self.token_usage = saturate(usage);
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Close the chat. Later turns are rejected; the history is kept.
    pub fn end(&mut self) {
        if self.status != SessionStatus::Ended {
            self.status = SessionStatus::Ended;
            self.updated_at = Utc::now();
        }
    }

    /// Project the active window into the provider's message shape.
    pub fn provider_messages(&self) -> Vec<Message> {
        self.messages
            .iter()
            .map(|m| Message {
                role: m.role().clone(),
                content: m.content().to_string(),
            })
            .collect()
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn status(&self) -> &SessionStatus {
        &self.status
    }

    pub fn configuration(&self) -> &ChatConfiguration {
        &self.configuration
    }

    /// The active window, oldest first.
    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// Archived messages in the order they were evicted.
    pub fn erased_messages(&self) -> &[ChatMessage] {
        &self.erased_messages
    }

    /// Sum of the active window's token counts.
    pub fn token_usage(&self) -> u32 {
        self.token_usage
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }
}

fn saturate(value: u64) -> u32 {
    u32::try_from(value).unwrap_or(u32::MAX)
}
