//! Completion clients.
//!
//! A completion client turns instructions plus chat turns into raw model
//! text. Envelope differences between upstream APIs stop here: callers only
//! ever see the generated text.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use replykit_embeddings::provider::upstream_error_message;

use crate::config::{ApiStyle, SuggestionConfig, validate_api_key};
use crate::error::{Result, SuggestionError};
use crate::types::ChatTurn;

/// Sampling settings for one completion call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sampling {
    pub temperature: f32,
    pub max_output_tokens: u32,
}

/// Trait for completion backends.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Generate text for `instructions` and `turns`.
    ///
    /// Fails with [`SuggestionError::Timeout`] when the deadline passes or
    /// `cancel` fires first; no partial output is returned.
    async fn complete(
        &self,
        instructions: &str,
        turns: &[ChatTurn],
        sampling: Sampling,
        cancel: &CancellationToken,
    ) -> Result<String>;
}

/// Client for OpenAI-compatible chat-completions and responses endpoints.
pub struct OpenAIChatClient {
    api_key: Option<String>,
    base_url: String,
    model: String,
    api_style: ApiStyle,
    timeout: Duration,
    client: reqwest::Client,
}

impl OpenAIChatClient {
    /// Create a client from the suggestion configuration.
    pub fn from_config(config: &SuggestionConfig) -> Self {
        Self {
            api_key: config.api_key.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model_id.clone(),
            api_style: config.api_style,
            timeout: config.request_timeout(),
            client: reqwest::Client::new(),
        }
    }

    /// Override the deadline.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Share an existing HTTP client (connection pool).
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    fn request_body(&self, instructions: &str, turns: &[ChatTurn], sampling: Sampling) -> Value {
        match self.api_style {
            ApiStyle::ChatCompletions => {
                let mut messages = Vec::with_capacity(turns.len() + 1);
                messages.push(json!({"role": "system", "content": instructions}));
                messages.extend(
                    turns
                        .iter()
                        .map(|t| json!({"role": t.role.as_str(), "content": t.content})),
                );
                json!({
                    "model": self.model,
                    "messages": messages,
                    "temperature": sampling.temperature,
                    "max_tokens": sampling.max_output_tokens,
                    "response_format": {"type": "json_object"}
                })
            }
            ApiStyle::Responses => {
                let input: Vec<Value> = turns
                    .iter()
                    .map(|t| json!({"role": t.role.as_str(), "content": t.content}))
                    .collect();
                json!({
                    "model": self.model,
                    "instructions": instructions,
                    "input": input,
                    "temperature": sampling.temperature,
                    "max_output_tokens": sampling.max_output_tokens,
                    "text": {"format": {"type": "json_object"}}
                })
            }
        }
    }

    fn endpoint(&self) -> String {
        match self.api_style {
            ApiStyle::ChatCompletions => format!("{}/chat/completions", self.base_url),
            ApiStyle::Responses => format!("{}/responses", self.base_url),
        }
    }

    async fn send(&self, api_key: &str, body: &Value) -> Result<String> {
        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(api_key)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            return Err(SuggestionError::transport(
                Some(status.as_u16()),
                upstream_error_message(&text)
                    .unwrap_or_else(|| format!("Error calling completion API: {status}")),
            ));
        }

        let envelope: Value = serde_json::from_str(&text)
            .map_err(|e| SuggestionError::Parse(format!("response is not JSON: {e}")))?;

        extract_text(&envelope)
            .ok_or_else(|| SuggestionError::Parse("no generated text in response".to_string()))
    }
}

#[async_trait]
impl CompletionClient for OpenAIChatClient {
    async fn complete(
        &self,
        instructions: &str,
        turns: &[ChatTurn],
        sampling: Sampling,
        cancel: &CancellationToken,
    ) -> Result<String> {
        let api_key = validate_api_key(self.api_key.as_deref())?;
        let body = self.request_body(instructions, turns, sampling);

        debug!(
            "Requesting completion from {} with model {}",
            self.endpoint(),
            self.model
        );

        // Dropping the in-flight future closes the connection.
        tokio::select! {
            _ = cancel.cancelled() => Err(SuggestionError::Timeout(self.timeout)),
            result = tokio::time::timeout(self.timeout, self.send(api_key, &body)) => {
                result.unwrap_or(Err(SuggestionError::Timeout(self.timeout)))
            }
        }
    }
}

/// Pull the generated text out of any supported envelope.
///
/// Accepted shapes, in order: `choices[0].message.content`,
/// `choices[0].text`, `output_text`, and the first `text` found under
/// `output[].content[]`.
pub fn extract_text(envelope: &Value) -> Option<String> {
    let choice = &envelope["choices"][0];
    if let Some(text) = choice["message"]["content"].as_str() {
        return Some(text.to_string());
    }
    if let Some(text) = choice["text"].as_str() {
        return Some(text.to_string());
    }
    if let Some(text) = envelope["output_text"].as_str() {
        return Some(text.to_string());
    }

    envelope["output"]
        .as_array()?
        .iter()
        .filter_map(|item| item["content"].as_array())
        .flatten()
        .find_map(|part| part["text"].as_str())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const SAMPLING: Sampling = Sampling {
        temperature: 0.7,
        max_output_tokens: 600,
    };

    fn client(server: &MockServer, style: ApiStyle) -> OpenAIChatClient {
        let mut config = SuggestionConfig::default()
            .with_api_key("sk-test")
            .with_base_url(server.uri());
        config.api_style = style;
        OpenAIChatClient::from_config(&config)
    }

    #[test]
    fn test_extract_text_envelopes() {
        let chat = json!({"choices": [{"message": {"role": "assistant", "content": "chat"}}]});
        let legacy = json!({"choices": [{"text": "legacy"}]});
        let responses = json!({"output": [{"type": "message", "content": [{"type": "output_text", "text": "responses"}]}]});
        let reasoning_first = json!({"output": [
            {"type": "reasoning", "summary": []},
            {"type": "message", "content": [{"type": "output_text", "text": "after reasoning"}]}
        ]});
        let convenience = json!({"output_text": "flat"});

        assert_eq!(extract_text(&chat).as_deref(), Some("chat"));
        assert_eq!(extract_text(&legacy).as_deref(), Some("legacy"));
        assert_eq!(extract_text(&responses).as_deref(), Some("responses"));
        assert_eq!(extract_text(&reasoning_first).as_deref(), Some("after reasoning"));
        assert_eq!(extract_text(&convenience).as_deref(), Some("flat"));
        assert_eq!(extract_text(&json!({"id": "x"})), None);
    }

    #[tokio::test]
    async fn test_chat_completions_request_and_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_partial_json(json!({
                "model": "gpt-3.5-turbo",
                "max_tokens": 600,
                "response_format": {"type": "json_object"},
                "messages": [
                    {"role": "system", "content": "be nice"},
                    {"role": "user", "content": "hi"}
                ]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"content": "{\"suggestions\": []}"}}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let text = client(&server, ApiStyle::ChatCompletions)
            .complete("be nice", &[ChatTurn::user("hi")], SAMPLING, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(text, "{\"suggestions\": []}");
    }

    #[tokio::test]
    async fn test_responses_style() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/responses"))
            .and(body_partial_json(json!({
                "instructions": "be nice",
                "input": [{"role": "user", "content": "hi"}],
                "max_output_tokens": 600
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "output": [{"content": [{"text": "hello"}]}]
            })))
            .mount(&server)
            .await;

        let text = client(&server, ApiStyle::Responses)
            .complete("be nice", &[ChatTurn::user("hi")], SAMPLING, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(text, "hello");
    }

    #[tokio::test]
    async fn test_upstream_error_message_is_surfaced() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_json(json!({
                "error": {"message": "Rate limit reached for requests", "type": "requests"}
            })))
            .mount(&server)
            .await;

        let err = client(&server, ApiStyle::ChatCompletions)
            .complete("x", &[], SAMPLING, &CancellationToken::new())
            .await
            .unwrap_err();

        match err {
            SuggestionError::Transport { status, message } => {
                assert_eq!(status, Some(429));
                assert_eq!(message, "Rate limit reached for requests");
            }
            other => panic!("expected transport error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_status_message_without_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = client(&server, ApiStyle::ChatCompletions)
            .complete("x", &[], SAMPLING, &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(err.to_string().contains("503"));
    }

    #[tokio::test]
    async fn test_malformed_envelope_is_parse_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "cmpl-1"})))
            .mount(&server)
            .await;

        let err = client(&server, ApiStyle::ChatCompletions)
            .complete("x", &[], SAMPLING, &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, SuggestionError::Parse(_)));
    }

    #[tokio::test]
    async fn test_missing_key_is_config_error() {
        let server = MockServer::start().await;
        let config = SuggestionConfig::default().with_base_url(server.uri());
        let err = OpenAIChatClient::from_config(&config)
            .complete("x", &[], SAMPLING, &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, SuggestionError::Config(_)));
        assert!(server.received_requests().await.unwrap_or_default().is_empty());
    }

    #[tokio::test]
    async fn test_deadline_yields_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"choices": [{"message": {"content": "late"}}]}))
                    .set_delay(Duration::from_secs(5)),
            )
            .mount(&server)
            .await;

        let err = client(&server, ApiStyle::ChatCompletions)
            .with_timeout(Duration::from_millis(200))
            .complete("x", &[], SAMPLING, &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, SuggestionError::Timeout(_)));
    }

    #[tokio::test]
    async fn test_cancellation_yields_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
            .mount(&server)
            .await;

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.cancel();
        });

        let err = client(&server, ApiStyle::ChatCompletions)
            .complete("x", &[], SAMPLING, &cancel)
            .await
            .unwrap_err();

        assert!(matches!(err, SuggestionError::Timeout(_)));
    }
}
