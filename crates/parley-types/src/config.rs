//! Application configuration types for Parley.
//!
//! `AppConfig` represents the top-level `config.toml` that controls the
//! HTTP server, the database location, the LLM provider endpoint, the
//! default chat configuration, and extra tokenizer registrations.

use serde::{Deserialize, Serialize};

use crate::chat::CompletionConfigInput;

/// Top-level configuration for the Parley service.
///
/// Loaded from `~/.parley/config.toml`. All fields have sensible defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub provider: ProviderSettings,

    /// Chat configuration stamped onto every inbound request.
    #[serde(default)]
    pub chat: CompletionConfigInput,

    /// Tokenizer registrations added on top of the built-in model families.
    #[serde(default)]
    pub models: Vec<ModelTokenizerConfig>,
}

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Token expected in the `Authorization` header. Auth is off when unset.
    #[serde(default)]
    pub auth_token: Option<String>,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            auth_token: None,
        }
    }
}

/// Database settings. The URL defaults to `parley.db` in the data directory.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default)]
    pub url: Option<String>,
}

/// LLM provider endpoint settings. The API key is read from the environment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderSettings {
    /// Provider name; well-known names ("openai", "gemini", "mistral",
    /// "groq") imply their base URL.
    #[serde(default = "default_provider_name")]
    pub name: String,

    /// Endpoint of any OpenAI-compatible API. Overrides the name's default.
    #[serde(default)]
    pub base_url: Option<String>,
}

fn default_provider_name() -> String {
    "openai".to_string()
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            name: default_provider_name(),
            base_url: None,
        }
    }
}

/// Which token-counting rule a model family uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenizerKind {
    /// Character-ratio estimate (`chars_per_token`, default 4).
    Chars,
    /// One token per whitespace-delimited word.
    Words,
}

/// Maps a model-name pattern to a tokenizer.
///
/// `pattern` is an exact model name or a prefix ending in `*`
/// (e.g., `"claude-*"`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelTokenizerConfig {
    pub pattern: String,
    pub tokenizer: TokenizerKind,
    #[serde(default)]
    pub chars_per_token: Option<f32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_config_default_values() {
        let config = AppConfig::default();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 8080);
        assert!(config.server.auth_token.is_none());
        assert!(config.database.url.is_none());
        assert_eq!(config.provider.name, "openai");
        assert_eq!(config.chat.model, "gpt-4o-mini");
        assert!(config.models.is_empty());
    }

    #[test]
    fn test_app_config_deserialize_empty() {
        let config: AppConfig = toml::from_str("").unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.chat.max_tokens, 1024);
    }

    #[test]
    fn test_app_config_deserialize_with_values() {
        let toml_str = r#"
[server]
port = 9000
auth_token = "secret"

[provider]
name = "local"
base_url = "http://localhost:11434/v1"

[chat]
model = "claude-sonnet-4"
model_max_tokens = 200000
stop = ["END", "STOP"]
initial_system_message = "Be brief."

[[models]]
pattern = "local-*"
tokenizer = "words"

[[models]]
pattern = "claude-sonnet-4"
tokenizer = "chars"
chars_per_token = 3.5
"#;
        let config: AppConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.auth_token.as_deref(), Some("secret"));
        assert_eq!(config.provider.name, "local");
        assert_eq!(
            config.provider.base_url.as_deref(),
            Some("http://localhost:11434/v1")
        );
        assert_eq!(config.chat.model, "claude-sonnet-4");
        assert_eq!(config.chat.stop, vec!["END", "STOP"]);
        // Unset chat fields keep their defaults.
        assert_eq!(config.chat.temperature, 1.0);
        assert_eq!(config.models.len(), 2);
        assert_eq!(config.models[0].tokenizer, TokenizerKind::Words);
        assert_eq!(config.models[1].chars_per_token, Some(3.5));
    }
}
