//! Configuration loader for Parley.
//!
//! Reads `config.toml` from the data directory (`~/.parley/` by default)
//! and deserializes it into [`AppConfig`]. Falls back to defaults when the
//! file is missing or malformed. A few settings can be overridden from the
//! environment.

use std::path::{Path, PathBuf};

use secrecy::SecretString;

use parley_types::config::AppConfig;

use crate::sqlite::pool::default_database_url;

pub const DATA_DIR_ENV: &str = "PARLEY_DATA_DIR";
pub const AUTH_TOKEN_ENV: &str = "PARLEY_AUTH_TOKEN";
pub const DATABASE_URL_ENV: &str = "PARLEY_DATABASE_URL";

/// API key variables, most specific first.
pub const API_KEY_ENVS: [&str; 2] = ["PARLEY_API_KEY", "OPENAI_API_KEY"];

/// Resolve the data directory.
///
/// Priority:
/// 1. `PARLEY_DATA_DIR` environment variable
/// 2. `~/.parley`
pub fn resolve_data_dir() -> PathBuf {
    data_dir_from(|key| std::env::var(key).ok())
}

fn data_dir_from(lookup: impl Fn(&str) -> Option<String>) -> PathBuf {
    if let Some(dir) = lookup(DATA_DIR_ENV).filter(|d| !d.is_empty()) {
        return PathBuf::from(dir);
    }

    if let Some(home) = dirs::home_dir() {
        return home.join(".parley");
    }

    // Last resort: current directory
    PathBuf::from(".parley")
}

/// Load configuration from `{data_dir}/config.toml`.
///
/// - If the file does not exist, returns [`AppConfig::default()`].
/// - If the file exists but fails to parse, logs a warning and returns the default.
/// - Otherwise returns the parsed config.
pub async fn load_config(data_dir: &Path) -> AppConfig {
    let config_path = data_dir.join("config.toml");

    let content = match tokio::fs::read_to_string(&config_path).await {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No config.toml found at {}, using defaults", config_path.display());
            return AppConfig::default();
        }
        Err(err) => {
            tracing::warn!("Failed to read {}: {err}, using defaults", config_path.display());
            return AppConfig::default();
        }
    };

    match toml::from_str::<AppConfig>(&content) {
        Ok(config) => config,
        Err(err) => {
            tracing::warn!(
                "Failed to parse {}: {err}, using defaults",
                config_path.display()
            );
            AppConfig::default()
        }
    }
}

/// Apply environment overrides on top of a loaded config.
///
/// `lookup` is `std::env::var` in production.
pub fn apply_env_overrides(
    mut config: AppConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> AppConfig {
    if let Some(token) = lookup(AUTH_TOKEN_ENV).filter(|t| !t.is_empty()) {
        config.server.auth_token = Some(token);
    }
    if let Some(url) = lookup(DATABASE_URL_ENV).filter(|u| !u.is_empty()) {
        config.database.url = Some(url);
    }
    config
}

/// Load `config.toml` and apply the process environment.
pub async fn load_effective_config(data_dir: &Path) -> AppConfig {
    apply_env_overrides(load_config(data_dir).await, |key| std::env::var(key).ok())
}

/// The configured database URL, or `parley.db` in the data directory.
pub fn database_url(config: &AppConfig, data_dir: &Path) -> String {
    config
        .database
        .url
        .clone()
        .unwrap_or_else(|| default_database_url(data_dir))
}

/// First non-empty API key among [`API_KEY_ENVS`].
pub fn resolve_api_key(lookup: impl Fn(&str) -> Option<String>) -> Option<SecretString> {
    API_KEY_ENVS
        .iter()
        .find_map(|key| lookup(key).filter(|v| !v.is_empty()))
        .map(SecretString::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[tokio::test]
    async fn load_config_missing_file_returns_default() {
        let tmp = TempDir::new().unwrap();
        let config = load_config(tmp.path()).await;
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.provider.name, "openai");
        assert!(config.models.is_empty());
    }

    #[tokio::test]
    async fn load_config_valid_toml_returns_parsed() {
        let tmp = TempDir::new().unwrap();
        tokio::fs::write(
            tmp.path().join("config.toml"),
            r#"
[server]
port = 9000
auth_token = "secret"

[chat]
model = "claude-3-5-sonnet"
model_max_tokens = 200000
max_tokens = 2048

[[models]]
pattern = "llama"
tokenizer = "words"
"#,
        )
        .await
        .unwrap();

        let config = load_config(tmp.path()).await;
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.auth_token.as_deref(), Some("secret"));
        assert_eq!(config.chat.model, "claude-3-5-sonnet");
        assert_eq!(config.chat.max_tokens, 2048);
        assert_eq!(config.models.len(), 1);
    }

    #[tokio::test]
    async fn load_config_invalid_toml_returns_default() {
        let tmp = TempDir::new().unwrap();
        tokio::fs::write(tmp.path().join("config.toml"), "this is [not valid toml")
            .await
            .unwrap();

        let config = load_config(tmp.path()).await;
        assert_eq!(config.server.port, 8080);
    }

    #[test]
    fn env_overrides_replace_file_values() {
        let mut config = AppConfig::default();
        config.server.auth_token = Some("from-file".to_string());

        let config = apply_env_overrides(
            config,
            env(&[
                (AUTH_TOKEN_ENV, "from-env"),
                (DATABASE_URL_ENV, "sqlite::memory:"),
            ]),
        );
        assert_eq!(config.server.auth_token.as_deref(), Some("from-env"));
        assert_eq!(config.database.url.as_deref(), Some("sqlite::memory:"));
    }

    #[test]
    fn empty_env_values_are_ignored() {
        let mut config = AppConfig::default();
        config.server.auth_token = Some("from-file".to_string());

        let config = apply_env_overrides(config, env(&[(AUTH_TOKEN_ENV, "")]));
        assert_eq!(config.server.auth_token.as_deref(), Some("from-file"));
    }

    #[test]
    fn database_url_defaults_to_data_dir() {
        let config = AppConfig::default();
        let url = database_url(&config, Path::new("/tmp/parley-test"));
        assert_eq!(url, "sqlite:///tmp/parley-test/parley.db?mode=rwc");
    }

    #[test]
    fn api_key_prefers_parley_variable() {
        let key = resolve_api_key(env(&[
            ("PARLEY_API_KEY", "sk-parley"),
            ("OPENAI_API_KEY", "sk-openai"),
        ]))
        .unwrap();
        assert_eq!(key.expose_secret(), "sk-parley");

        let key = resolve_api_key(env(&[("OPENAI_API_KEY", "sk-openai")])).unwrap();
        assert_eq!(key.expose_secret(), "sk-openai");

        assert!(resolve_api_key(env(&[])).is_none());
    }

    #[test]
    fn data_dir_from_env() {
        let dir = data_dir_from(env(&[(DATA_DIR_ENV, "/tmp/test-parley")]));
        assert_eq!(dir, PathBuf::from("/tmp/test-parley"));
    }
}
