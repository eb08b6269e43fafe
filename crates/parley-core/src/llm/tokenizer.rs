//! Token counters and the registry that binds them to model names.
//!
//! Counting is an estimate, not a vendor tokenizer: character ratios per
//! model family, or whitespace words for models registered that way.

use std::sync::Arc;

use tracing::debug;

use parley_types::config::{ModelTokenizerConfig, TokenizerKind};
use parley_types::error::ChatError;
use parley_types::model::{Model, TokenCounter};

/// Characters per token assumed when a `chars` registration omits the ratio.
pub const DEFAULT_CHARS_PER_TOKEN: f32 = 4.0;

/// Estimates tokens as `ceil(chars / chars_per_token)`.
///
/// Non-empty text always costs at least one token.
#[derive(Debug, Clone, Copy)]
pub struct CharEstimateCounter {
    chars_per_token: f32,
}

impl CharEstimateCounter {
    pub fn new(chars_per_token: f32) -> Result<Self, ChatError> {
        if !chars_per_token.is_finite() || chars_per_token <= 0.0 {
            return Err(ChatError::InvalidConfiguration(format!(
                "chars_per_token must be positive, got {chars_per_token}"
            )));
        }
        Ok(Self { chars_per_token })
    }
}

impl TokenCounter for CharEstimateCounter {
    fn count(&self, text: &str) -> u32 {
        let chars = text.chars().count();
        if chars == 0 {
            return 0;
        }
        let estimate = (chars as f64 / self.chars_per_token as f64).ceil() as u32;
        estimate.max(1)
    }
}

/// One token per whitespace-delimited word.
#[derive(Debug, Clone, Copy, Default)]
pub struct WordCounter;

impl TokenCounter for WordCounter {
    fn count(&self, text: &str) -> u32 {
        text.split_whitespace().count() as u32
    }
}

struct Registration {
    pattern: String,
    counter: Arc<dyn TokenCounter>,
}

impl Registration {
    /// The prefix of a trailing-`*` pattern, `None` for an exact pattern.
    fn prefix(&self) -> Option<&str> {
        self.pattern.strip_suffix('*')
    }
}

/// Resolves model names to [`Model`]s carrying the right token counter.
///
/// Patterns are exact names or prefixes ending in `*`. An exact match wins
/// over any prefix; among prefixes the longest wins; among equal
/// candidates the most recent registration wins.
pub struct ModelRegistry {
    registrations: Vec<Registration>,
}

impl ModelRegistry {
    /// An empty registry that resolves nothing.
    pub fn empty() -> Self {
        Self {
            registrations: Vec::new(),
        }
    }

    /// Registry with the built-in model families.
    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        let four = Arc::new(CharEstimateCounter {
            chars_per_token: DEFAULT_CHARS_PER_TOKEN,
        });
        let claude = Arc::new(CharEstimateCounter {
            chars_per_token: 3.5,
        });

        for pattern in ["gpt-4o*", "gpt-4*", "gpt-3.5*", "o1*", "o3*", "o4*"] {
            registry.register(pattern, four.clone());
        }
        registry.register("claude*", claude);
        for pattern in ["mistral*", "gemini*"] {
            registry.register(pattern, four.clone());
        }
        registry
    }

    /// Built-in families plus the `[[models]]` registrations from config.
    pub fn from_config(models: &[ModelTokenizerConfig]) -> Result<Self, ChatError> {
        let mut registry = Self::with_defaults();
        for entry in models {
            let counter: Arc<dyn TokenCounter> = match entry.tokenizer {
                TokenizerKind::Chars => Arc::new(CharEstimateCounter::new(
                    entry.chars_per_token.unwrap_or(DEFAULT_CHARS_PER_TOKEN),
                )?),
                TokenizerKind::Words => Arc::new(WordCounter),
            };
            registry.register(entry.pattern.clone(), counter);
            debug!(pattern = %entry.pattern, tokenizer = ?entry.tokenizer, "Registered model tokenizer");
        }
        Ok(registry)
    }

    pub fn register(&mut self, pattern: impl Into<String>, counter: Arc<dyn TokenCounter>) {
        self.registrations.push(Registration {
            pattern: pattern.into(),
            counter,
        });
    }

    fn counter_for(&self, name: &str) -> Option<Arc<dyn TokenCounter>> {
        if let Some(exact) = self
            .registrations
            .iter()
            .rev()
            .find(|r| r.prefix().is_none() && r.pattern == name)
        {
            return Some(exact.counter.clone());
        }

        // max_by_key keeps the last maximum, i.e. the latest registration.
        self.registrations
            .iter()
            .filter_map(|r| {
                r.prefix()
                    .filter(|p| name.starts_with(p))
                    .map(|p| (p.len(), r))
            })
            .max_by_key(|(len, _)| *len)
            .map(|(_, r)| r.counter.clone())
    }

    /// Whether `name` resolves to a registered tokenizer.
    pub fn supports(&self, name: &str) -> bool {
        self.counter_for(name).is_some()
    }

    /// Build a [`Model`] for `name` with the given context capacity.
    ///
    /// Fails with `InvalidConfiguration` for unknown names or zero capacity.
    pub fn model(&self, name: &str, capacity: u32) -> Result<Model, ChatError> {
        let counter = self.counter_for(name).ok_or_else(|| {
            ChatError::InvalidConfiguration(format!("unknown model '{name}'"))
        })?;
        Model::new(name, capacity, counter)
    }
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl std::fmt::Debug for ModelRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let patterns: Vec<&str> = self.registrations.iter().map(|r| r.pattern.as_str()).collect();
        f.debug_struct("ModelRegistry")
            .field("patterns", &patterns)
            .finish()
    }
}
