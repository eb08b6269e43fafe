//! In-memory repository and scripted provider for exercising the flows.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use uuid::Uuid;

use parley_types::chat::{CompletionConfigInput, CompletionInput};
use parley_types::error::RepositoryError;
use parley_types::llm::{
    CompletionRequest, CompletionResponse, LlmError, StopReason, StreamEvent, Usage,
};

use super::repository::ChatRepository;
use super::service::ChatService;
use super::session::ChatSession;
use crate::llm::box_provider::BoxLlmProvider;
use crate::llm::provider::{LlmEventStream, LlmProvider};
use crate::llm::tokenizer::{ModelRegistry, WordCounter};

#[derive(Default)]
pub struct InMemoryChatRepository {
    sessions: Mutex<HashMap<Uuid, ChatSession>>,
    create_calls: AtomicUsize,
    find_calls: AtomicUsize,
    save_calls: AtomicUsize,
    fail_find: AtomicBool,
    fail_save: AtomicBool,
}

impl InMemoryChatRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every `find_session` fail with a connection error.
    pub fn fail_find(&self) {
        self.fail_find.store(true, Ordering::SeqCst);
    }

    pub fn fail_save(&self) {
        self.fail_save.store(true, Ordering::SeqCst);
    }

    pub fn get(&self, id: &Uuid) -> Option<ChatSession> {
        self.sessions.lock().unwrap().get(id).cloned()
    }

    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    pub fn find_calls(&self) -> usize {
        self.find_calls.load(Ordering::SeqCst)
    }

    pub fn save_calls(&self) -> usize {
        self.save_calls.load(Ordering::SeqCst)
    }
}

impl ChatRepository for InMemoryChatRepository {
    async fn create_session(&self, session: &ChatSession) -> Result<(), RepositoryError> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        let mut sessions = self.sessions.lock().unwrap();
        if sessions.contains_key(&session.id()) {
            return Err(RepositoryError::Conflict(session.id().to_string()));
        }
        sessions.insert(session.id(), session.clone());
        Ok(())
    }

    async fn find_session(&self, session_id: &Uuid) -> Result<ChatSession, RepositoryError> {
        self.find_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_find.load(Ordering::SeqCst) {
            return Err(RepositoryError::Connection);
        }
        self.get(session_id).ok_or(RepositoryError::NotFound)
    }

    async fn save_session(&self, session: &ChatSession) -> Result<(), RepositoryError> {
        self.save_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_save.load(Ordering::SeqCst) {
            return Err(RepositoryError::Query("disk full".to_string()));
        }
        self.sessions
            .lock()
            .unwrap()
            .insert(session.id(), session.clone());
        Ok(())
    }
}

/// One scripted step of a provider stream.
#[derive(Debug, Clone)]
pub enum Step {
    Event(StreamEvent),
    Fail(String),
    /// Never yields again.
    Hang,
}

pub fn delta(text: &str) -> Step {
    Step::Event(StreamEvent::TextDelta {
        text: text.to_string(),
    })
}

#[derive(Debug, Clone)]
enum Reply {
    Text(String),
    Fail,
    Hang,
}

pub struct ScriptedProvider {
    reply: Reply,
    steps: Vec<Step>,
    requests: Arc<Mutex<Vec<CompletionRequest>>>,
}

impl ScriptedProvider {
    fn with(reply: Reply, steps: Vec<Step>) -> Self {
        Self {
            reply,
            steps,
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn replying(text: &str) -> Self {
        Self::with(Reply::Text(text.to_string()), Vec::new())
    }

    pub fn failing() -> Self {
        Self::with(Reply::Fail, Vec::new())
    }

    pub fn hanging() -> Self {
        Self::with(Reply::Hang, vec![Step::Hang])
    }

    pub fn streaming(steps: Vec<Step>) -> Self {
        Self::with(Reply::Fail, steps)
    }

    /// Every request received, in order.
    pub fn requests(&self) -> Arc<Mutex<Vec<CompletionRequest>>> {
        self.requests.clone()
    }
}

impl LlmProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse, LlmError> {
        self.requests.lock().unwrap().push(request.clone());
        match self.reply.clone() {
            Reply::Text(content) => Ok(CompletionResponse {
                id: "resp-1".to_string(),
                content,
                model: request.model.clone(),
                stop_reason: StopReason::EndTurn,
                usage: Usage::default(),
            }),
            Reply::Fail => Err(LlmError::Overloaded("try later".to_string())),
            Reply::Hang => {
                futures_util::future::pending::<()>().await;
                Err(LlmError::Stream("unreachable".to_string()))
            }
        }
    }

    fn stream(&self, request: CompletionRequest) -> LlmEventStream {
        self.requests.lock().unwrap().push(request);
        let steps = self.steps.clone();
        Box::pin(async_stream::stream! {
            for step in steps {
                match step {
                    Step::Event(event) => yield Ok(event),
                    Step::Fail(message) => {
                        yield Err(LlmError::Stream(message));
                        break;
                    }
                    Step::Hang => futures_util::future::pending::<()>().await,
                }
            }
        })
    }
}

/// Chat configuration for model "m": 4096-token context, 50-token reply.
pub fn config_input() -> CompletionConfigInput {
    CompletionConfigInput {
        model: "m".to_string(),
        model_max_tokens: 4096,
        max_tokens: 50,
        initial_system_message: "You are helpful.".to_string(),
        ..CompletionConfigInput::default()
    }
}

pub fn input(chat_id: Option<Uuid>, message: &str) -> CompletionInput {
    CompletionInput {
        chat_id,
        user_id: "u1".to_string(),
        user_message: message.to_string(),
        configuration: config_input(),
    }
}

/// Same as [`input`] but with a 30-token context and a 10-token reply
/// reserve, so a few short turns force eviction.
pub fn tight_input(chat_id: Option<Uuid>, message: &str) -> CompletionInput {
    let mut input = input(chat_id, message);
    input.configuration.model_max_tokens = 30;
    input.configuration.max_tokens = 10;
    input
}

/// Service whose registry counts words for model "m".
pub fn service(
    repo: InMemoryChatRepository,
    provider: ScriptedProvider,
) -> ChatService<InMemoryChatRepository> {
    let mut models = ModelRegistry::empty();
    models.register("m", Arc::new(WordCounter));
    ChatService::new(repo, Arc::new(BoxLlmProvider::new(provider)), Arc::new(models))
}
