//! The suggestion service.
//!
//! One request walks `Idle -> Retrieving -> Building -> Awaiting -> Parsing`
//! and ends in `Success` or `Failed`. Only the completion call can fail the
//! request; retrieval degrades to "no examples" and parsing always yields
//! something. Remembering the exchange happens on a background task after
//! the result is ready; call [`SuggestionService::drain`] before shutting the
//! runtime down so those writes land.

use std::fmt;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use replykit_conversations::{ConversationStore, RetrievedExample};
use replykit_embeddings::OpenAIProvider;

use crate::completion::{CompletionClient, OpenAIChatClient, Sampling};
use crate::config::SuggestionConfig;
use crate::error::{Result, SuggestionError};
use crate::parser;
use crate::prompt::PromptBuilder;
use crate::types::{ChatTurn, Suggestion};

/// Stage of a suggestion request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    Idle,
    Retrieving,
    Building,
    Awaiting,
    Parsing,
    Success,
    Failed,
}

impl fmt::Display for RequestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Retrieving => "retrieving examples",
            Self::Building => "building prompt",
            Self::Awaiting => "awaiting completion",
            Self::Parsing => "parsing",
            Self::Success => "success",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// What the calling layer hands over for one request.
#[derive(Debug, Clone, Default)]
pub struct SuggestionRequest {
    /// The newest fan message.
    pub message: String,

    /// Earlier turns, oldest first.
    pub history: Vec<ChatTurn>,

    /// Ask for suggestions unlike the previous ones.
    pub is_regenerate: bool,
}

impl SuggestionRequest {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Self::default()
        }
    }

    pub fn with_history(mut self, history: Vec<ChatTurn>) -> Self {
        self.history = history;
        self
    }

    pub fn regenerate(mut self) -> Self {
        self.is_regenerate = true;
        self
    }
}

/// Tracks and logs the state of one request.
struct Progress {
    state: RequestState,
}

impl Progress {
    fn start() -> Self {
        Self {
            state: RequestState::Idle,
        }
    }

    fn advance(&mut self, next: RequestState) {
        debug!("Suggestion request: {} -> {next}", self.state);
        self.state = next;
    }
}

/// Orchestrates retrieval, prompting, completion, and parsing.
pub struct SuggestionService {
    config: SuggestionConfig,
    completion: Arc<dyn CompletionClient>,
    store: Option<Arc<ConversationStore>>,
    prompt_builder: PromptBuilder,
    background: TaskTracker,
}

impl SuggestionService {
    /// Create a service without a conversation store.
    pub fn new(config: SuggestionConfig, completion: Arc<dyn CompletionClient>) -> Self {
        Self {
            config,
            completion,
            store: None,
            prompt_builder: PromptBuilder::new(),
            background: TaskTracker::new(),
        }
    }

    /// Wire up the OpenAI clients and the on-disk store described by `config`.
    pub async fn from_config(config: SuggestionConfig) -> Result<Self> {
        let http = reqwest::Client::new();

        let embedder = OpenAIProvider::new()
            .with_api_key(config.api_key.clone().unwrap_or_default())
            .with_base_url(config.base_url.as_str())
            .with_model(config.embedding_model.as_str())
            .with_client(http.clone());
        let embedder = Arc::new(embedder);

        let store = match config.resolved_store_path() {
            Some(path) => ConversationStore::open(&path, embedder).await.map_err(|e| {
                SuggestionError::Config(format!(
                    "failed to open conversation store {}: {e}",
                    path.display()
                ))
            })?,
            None => {
                warn!("No data directory available; conversations are kept in memory only");
                ConversationStore::in_memory(embedder)
            }
        };

        let completion = OpenAIChatClient::from_config(&config).with_client(http);

        Ok(Self::new(config, Arc::new(completion)).with_store(Arc::new(store)))
    }

    /// Use `store` for retrieval and for remembering exchanges.
    pub fn with_store(mut self, store: Arc<ConversationStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_prompt_builder(mut self, builder: PromptBuilder) -> Self {
        self.prompt_builder = builder;
        self
    }

    pub fn config(&self) -> &SuggestionConfig {
        &self.config
    }

    /// The conversation store, if one is attached.
    pub fn store(&self) -> Option<&Arc<ConversationStore>> {
        self.store.as_ref()
    }

    /// Produce suggestions for `request`.
    pub async fn suggest(&self, request: &SuggestionRequest) -> Result<Vec<Suggestion>> {
        self.suggest_with_cancel(request, &CancellationToken::new())
            .await
    }

    /// Produce suggestions for `request`, giving up when `cancel` fires.
    pub async fn suggest_with_cancel(
        &self,
        request: &SuggestionRequest,
        cancel: &CancellationToken,
    ) -> Result<Vec<Suggestion>> {
        let mut progress = Progress::start();

        if request.message.trim().is_empty() {
            progress.advance(RequestState::Failed);
            return Err(SuggestionError::InvalidRequest(
                "no message to reply to".to_string(),
            ));
        }

        // Retrieval sends the key upstream too, so reject a bad one first.
        if let Err(e) = self.config.credential() {
            progress.advance(RequestState::Failed);
            return Err(e);
        }

        progress.advance(RequestState::Retrieving);
        let examples = self.retrieve(&request.message).await;

        progress.advance(RequestState::Building);
        let count = self.config.suggestion_count();
        let prompt = self.prompt_builder.build(
            &request.message,
            &request.history,
            &examples,
            &self.config.writing_style,
            count,
            request.is_regenerate,
        );

        progress.advance(RequestState::Awaiting);
        let sampling = Sampling {
            temperature: self.config.temperature_for(request.is_regenerate),
            max_output_tokens: self.config.max_output_tokens,
        };
        let raw = match self
            .completion
            .complete(&prompt.instructions, &prompt.turns, sampling, cancel)
            .await
        {
            Ok(raw) => raw,
            Err(e) => {
                progress.advance(RequestState::Failed);
                warn!("Suggestion request failed: {e}");
                return Err(e);
            }
        };

        progress.advance(RequestState::Parsing);
        let suggestions = parser::parse(&raw, count);

        progress.advance(RequestState::Success);
        info!(
            "Generated {} suggestions using {} examples",
            suggestions.len(),
            examples.len()
        );

        if !request.is_regenerate {
            self.remember_in_background(&request.message, &suggestions);
        }

        Ok(suggestions)
    }

    async fn retrieve(&self, message: &str) -> Vec<RetrievedExample> {
        match self.store {
            Some(ref store) => store.query(message).await,
            None => Vec::new(),
        }
    }

    /// Wait for background writes started by earlier requests.
    pub async fn drain(&self) {
        self.background.close();
        self.background.wait().await;
        self.background.reopen();
    }

    /// Store the exchange on a background task. Failures are only logged.
    fn remember_in_background(&self, message: &str, suggestions: &[Suggestion]) {
        if !self.config.remember_suggestions {
            return;
        }
        let (Some(store), Some(first)) = (self.store.as_ref(), suggestions.first()) else {
            return;
        };

        let store = Arc::clone(store);
        let message = message.to_string();
        let responses = first.messages.clone();

        self.background.spawn(async move {
            match store.remember(&message, responses).await {
                Ok(_) => debug!("Remembered conversation for future suggestions"),
                Err(e) => warn!("Failed to remember conversation: {e}"),
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::sync::Mutex;

    use crate::types::SuggestionKind;

    /// Returns a canned completion and records what it was asked.
    struct CannedCompletion {
        reply: std::result::Result<String, String>,
        seen: Mutex<Vec<(String, Vec<ChatTurn>, Sampling)>>,
    }

    impl CannedCompletion {
        fn ok(reply: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: Ok(reply.to_string()),
                seen: Mutex::new(Vec::new()),
            })
        }

        fn failing(message: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: Err(message.to_string()),
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl CompletionClient for CannedCompletion {
        async fn complete(
            &self,
            instructions: &str,
            turns: &[ChatTurn],
            sampling: Sampling,
            _cancel: &CancellationToken,
        ) -> Result<String> {
            self.seen
                .lock()
                .unwrap()
                .push((instructions.to_string(), turns.to_vec(), sampling));
            self.reply
                .clone()
                .map_err(|message| SuggestionError::transport(Some(500), message))
        }
    }

    fn keyed_config() -> SuggestionConfig {
        SuggestionConfig::default().with_api_key("sk-test")
    }

    #[test]
    fn test_state_names() {
        assert_eq!(RequestState::Awaiting.to_string(), "awaiting completion");
        assert_eq!(RequestState::Failed.to_string(), "failed");
    }

    #[tokio::test]
    async fn test_suggest_without_store() {
        let completion = CannedCompletion::ok(
            r#"{"suggestions":[{"kind":"single","messages":["hey!"]},{"kind":"multi","messages":["hi","how are you"]}]}"#,
        );
        let service = SuggestionService::new(keyed_config(), completion.clone());

        let suggestions = service
            .suggest(&SuggestionRequest::new("hello"))
            .await
            .unwrap();

        assert_eq!(suggestions.len(), 2);
        assert_eq!(suggestions[1].kind, SuggestionKind::Multi);

        let seen = completion.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].2.temperature, 0.7);
        assert_eq!(seen[0].2.max_output_tokens, 600);
    }

    #[tokio::test]
    async fn test_regenerate_uses_higher_temperature() {
        let completion = CannedCompletion::ok("1. a\n2. b");
        let service = SuggestionService::new(keyed_config(), completion.clone());

        service
            .suggest(&SuggestionRequest::new("hello").regenerate())
            .await
            .unwrap();

        let seen = completion.seen.lock().unwrap();
        assert_eq!(seen[0].2.temperature, 1.0);
        assert!(seen[0].0.contains("regeneration request"));
    }

    #[tokio::test]
    async fn test_history_reaches_completion() {
        let completion = CannedCompletion::ok("ok");
        let config = keyed_config()
            .with_writing_style("short and flirty")
            .with_num_suggestions(2);
        let service = SuggestionService::new(config, completion.clone());

        let history = vec![ChatTurn::user("hi"), ChatTurn::assistant("hey you")];
        service
            .suggest(&SuggestionRequest::new("what's up").with_history(history.clone()))
            .await
            .unwrap();

        let seen = completion.seen.lock().unwrap();
        let (instructions, turns, _) = &seen[0];
        assert!(instructions.contains("short and flirty"));
        assert!(instructions.contains("Write 2 different suggested replies"));
        assert_eq!(&turns[..2], history.as_slice());
        assert_eq!(turns.len(), 3);
    }

    #[tokio::test]
    async fn test_completion_failure_propagates() {
        let service = SuggestionService::new(
            keyed_config(),
            CannedCompletion::failing("server exploded"),
        );

        let err = service
            .suggest(&SuggestionRequest::new("hello"))
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "server exploded");
        assert_eq!(err.kind(), crate::error::ErrorKind::TransportError);
    }

    #[tokio::test]
    async fn test_empty_message_is_rejected() {
        let completion = CannedCompletion::ok("unused");
        let service = SuggestionService::new(keyed_config(), completion.clone());

        let err = service
            .suggest(&SuggestionRequest::new("  "))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), crate::error::ErrorKind::InputError);
        assert!(completion.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_bad_credential_fails_before_completion() {
        let completion = CannedCompletion::ok("unused");
        let config = SuggestionConfig::default().with_api_key("pk-123");
        let service = SuggestionService::new(config, completion.clone());

        let err = service
            .suggest(&SuggestionRequest::new("hello"))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), crate::error::ErrorKind::ConfigError);
        assert!(err.to_string().starts_with("invalid API key format"));
        assert!(completion.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_drain_without_background_work() {
        let service = SuggestionService::new(keyed_config(), CannedCompletion::ok("hi"));
        service.drain().await;
        service.drain().await;
    }
}
