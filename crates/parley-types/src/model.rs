//! LLM model value object and the token-counting capability it carries.

use std::fmt;
use std::sync::Arc;

use crate::error::ChatError;

/// Counts tokens in arbitrary text under one model family's rules.
///
/// Implementations must be deterministic: the same text always yields
/// the same count.
pub trait TokenCounter: Send + Sync {
    fn count(&self, text: &str) -> u32;
}

/// A named LLM variant with a fixed context capacity.
///
/// Built through `ModelRegistry` in `parley-core`, which picks the
/// token counter matching the model name.
#[derive(Clone)]
pub struct Model {
    name: String,
    max_tokens: u32,
    counter: Arc<dyn TokenCounter>,
}

impl Model {
    /// Create a model. Fails if the name is empty or the capacity is zero.
    pub fn new(
        name: impl Into<String>,
        max_tokens: u32,
        counter: Arc<dyn TokenCounter>,
    ) -> Result<Self, ChatError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(ChatError::InvalidConfiguration(
                "model name must not be empty".to_string(),
            ));
        }
        if max_tokens == 0 {
            return Err(ChatError::InvalidConfiguration(format!(
                "model '{name}' must have a positive context capacity"
            )));
        }

        Ok(Self {
            name,
            max_tokens,
            counter,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The model's hard context limit in tokens.
    pub fn capacity(&self) -> u32 {
        self.max_tokens
    }

    /// Count the tokens `text` costs under this model's tokenizer.
    pub fn token_count(&self, text: &str) -> u32 {
        self.counter.count(text)
    }
}

impl fmt::Debug for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Model")
            .field("name", &self.name)
            .field("max_tokens", &self.max_tokens)
            .finish_non_exhaustive()
    }
}

impl PartialEq for Model {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.max_tokens == other.max_tokens
    }
}
