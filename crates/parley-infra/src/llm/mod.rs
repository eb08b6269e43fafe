//! LLM provider implementations.
//!
//! Contains the OpenAI-compatible implementation of the [`LlmProvider`]
//! trait defined in `parley-core`, and a factory ([`create_provider`]) that
//! builds it from the `[provider]` section of `config.toml`.
//!
//! [`LlmProvider`]: parley_core::llm::provider::LlmProvider

pub mod openai_compat;

use secrecy::SecretString;

use parley_core::llm::box_provider::BoxLlmProvider;
use parley_types::config::ProviderSettings;
use parley_types::llm::LlmError;

use self::openai_compat::config::{known_base_url, OpenAiCompatConfig};
use self::openai_compat::OpenAiCompatibleProvider;

/// Create a [`BoxLlmProvider`] from [`ProviderSettings`].
///
/// The base URL is taken from the settings, or inferred from a well-known
/// provider name.
///
/// # Errors
///
/// Returns [`LlmError::AuthenticationFailed`] when no API key is available
/// and [`LlmError::InvalidRequest`] when the endpoint cannot be determined.
pub fn create_provider(
    settings: &ProviderSettings,
    api_key: Option<SecretString>,
) -> Result<BoxLlmProvider, LlmError> {
    let api_key = api_key.ok_or(LlmError::AuthenticationFailed)?;

    let base_url = match settings.base_url.as_deref() {
        Some(url) => url.to_string(),
        None => known_base_url(&settings.name)
            .map(str::to_string)
            .ok_or_else(|| {
                LlmError::InvalidRequest(format!(
                    "unknown provider '{}' requires a base_url",
                    settings.name
                ))
            })?,
    };

    tracing::debug!(provider = %settings.name, base_url = %base_url, "Creating LLM provider");

    let provider = OpenAiCompatibleProvider::new(OpenAiCompatConfig {
        provider_name: settings.name.clone(),
        base_url,
        api_key,
    });
    Ok(BoxLlmProvider::new(provider))
}
