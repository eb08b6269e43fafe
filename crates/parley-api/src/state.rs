//! Application state wiring the chat service together.
//!
//! `ChatService` is generic over its repository; AppState pins it to the
//! SQLite implementation and carries the server-wide settings both the CLI
//! and the HTTP handlers need.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use tokio_util::sync::CancellationToken;

use parley_core::chat::service::ChatService;
use parley_core::llm::box_provider::BoxLlmProvider;
use parley_core::llm::tokenizer::ModelRegistry;
use parley_infra::config::{database_url, resolve_api_key};
use parley_infra::llm::create_provider;
use parley_infra::sqlite::chat::SqliteChatRepository;
use parley_infra::sqlite::pool::DatabasePool;
use parley_types::chat::CompletionConfigInput;
use parley_types::config::AppConfig;

pub type ConcreteChatService = ChatService<SqliteChatRepository>;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub chat_service: Arc<ConcreteChatService>,
    /// Chat configuration stamped onto every request.
    pub chat_defaults: Arc<CompletionConfigInput>,
    /// Token required on chat routes; auth is off when `None`.
    pub auth_token: Option<Arc<str>>,
    /// Cancelled on shutdown; every turn runs under a child of it.
    pub shutdown: CancellationToken,
}

impl AppState {
    /// Connect to the database, build the provider and wire the service.
    pub async fn init(config: &AppConfig, data_dir: PathBuf) -> anyhow::Result<Self> {
        tokio::fs::create_dir_all(&data_dir)
            .await
            .with_context(|| format!("Failed to create data directory {}", data_dir.display()))?;

        let db_pool = DatabasePool::new(&database_url(config, &data_dir))
            .await
            .context("Failed to open database")?;

        let models = Arc::new(
            ModelRegistry::from_config(&config.models).context("Invalid [[models]] entry")?,
        );

        let provider = create_provider(
            &config.provider,
            resolve_api_key(|key| std::env::var(key).ok()),
        )
        .context("Failed to create LLM provider (set PARLEY_API_KEY or OPENAI_API_KEY)")?;

        let repo = SqliteChatRepository::new(db_pool, models.clone());
        let chat_service = ChatService::new(repo, Arc::new(provider), models);

        Self::new(chat_service, config)
    }

    /// Wrap an already-built service. Fails if the `[chat]` defaults do
    /// not form a valid configuration.
    pub fn new(chat_service: ConcreteChatService, config: &AppConfig) -> anyhow::Result<Self> {
        chat_service
            .configuration_for(&config.chat)
            .and_then(|configuration| configuration.validate())
            .context("Invalid [chat] configuration")?;

        Ok(Self {
            chat_service: Arc::new(chat_service),
            chat_defaults: Arc::new(config.chat.clone()),
            auth_token: config.server.auth_token.as_deref().map(Arc::from),
            shutdown: CancellationToken::new(),
        })
    }

    pub fn provider(&self) -> &BoxLlmProvider {
        self.chat_service.provider()
    }
}
