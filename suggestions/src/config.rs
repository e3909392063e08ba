//! Configuration for suggestion requests.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use replykit_embeddings::DEFAULT_EMBEDDING_MODEL;

use crate::error::{Result, SuggestionError};

/// Environment variable consulted when no key is configured.
pub const API_KEY_ENV: &str = "OPENAI_API_KEY";

/// Default completion model.
pub const DEFAULT_MODEL: &str = "gpt-3.5-turbo";

/// Upper bound on suggestions per request.
pub const MAX_SUGGESTIONS: usize = 10;

/// Default location of the configuration file.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("replykit").join("config.toml"))
}

/// Which completion endpoint to call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApiStyle {
    /// `POST /chat/completions`, answer in `choices[0].message.content`.
    #[default]
    ChatCompletions,
    /// `POST /responses`, answer in `output[0].content[0].text`.
    Responses,
}

/// Configuration for the suggestion service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SuggestionConfig {
    /// API credential. Falls back to `OPENAI_API_KEY`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Completion model.
    pub model_id: String,

    /// Embedding model used for retrieval.
    pub embedding_model: String,

    /// Style directive applied to every suggestion; empty for none.
    pub writing_style: String,

    /// Number of suggestions to ask for.
    pub num_suggestions: usize,

    /// API base URL, without a trailing slash.
    pub base_url: String,

    pub api_style: ApiStyle,

    /// Sampling temperature for first requests.
    pub temperature: f32,

    /// Sampling temperature for regenerate requests.
    pub regenerate_temperature: f32,

    pub max_output_tokens: u32,

    /// Deadline for one completion call.
    pub request_timeout_secs: u64,

    /// Store answered exchanges for future retrieval.
    pub remember_suggestions: bool,

    /// Conversation store file; the platform data dir when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub store_path: Option<PathBuf>,
}

impl Default for SuggestionConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model_id: DEFAULT_MODEL.to_string(),
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
            writing_style: String::new(),
            num_suggestions: 3,
            base_url: "https://api.openai.com/v1".to_string(),
            api_style: ApiStyle::default(),
            temperature: 0.7,
            regenerate_temperature: 1.0,
            max_output_tokens: 600,
            request_timeout_secs: 25,
            remember_suggestions: true,
            store_path: None,
        }
    }
}

impl SuggestionConfig {
    /// Load from a TOML file, then fill the key from the environment.
    /// A missing file yields the defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let config = match std::fs::read_to_string(path) {
            Ok(content) => Self::from_toml(&content).map_err(|e| {
                SuggestionError::Config(format!("invalid config {}: {e}", path.display()))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No config at {}, using defaults", path.display());
                Self::default()
            }
            Err(e) => {
                return Err(SuggestionError::Config(format!(
                    "failed to read config {}: {e}",
                    path.display()
                )));
            }
        };

        Ok(config.with_env_fallback(std::env::var(API_KEY_ENV).ok()))
    }

    /// Parse a TOML document. Missing fields take their defaults.
    pub fn from_toml(content: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Use `key` when no non-empty key is configured.
    pub fn with_env_fallback(mut self, key: Option<String>) -> Self {
        if self.api_key.as_deref().is_none_or(|k| k.trim().is_empty()) {
            self.api_key = key.filter(|k| !k.trim().is_empty());
        }
        self
    }

    /// Set the API key.
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Point both endpoints at another base URL.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Set the writing style directive.
    pub fn with_writing_style(mut self, style: impl Into<String>) -> Self {
        self.writing_style = style.into();
        self
    }

    /// Set the number of suggestions requested.
    pub fn with_num_suggestions(mut self, count: usize) -> Self {
        self.num_suggestions = count;
        self
    }

    /// Set the completion deadline.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout_secs = timeout.as_secs().max(1);
        self
    }

    /// The validated API key.
    pub fn credential(&self) -> Result<&str> {
        validate_api_key(self.api_key.as_deref())
    }

    /// Requested count, clamped to `1..=MAX_SUGGESTIONS`.
    pub fn suggestion_count(&self) -> usize {
        self.num_suggestions.clamp(1, MAX_SUGGESTIONS)
    }

    /// Sampling temperature for a request.
    pub fn temperature_for(&self, is_regenerate: bool) -> f32 {
        if is_regenerate {
            self.regenerate_temperature
        } else {
            self.temperature
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Configured store path, or the default one.
    pub fn resolved_store_path(&self) -> Option<PathBuf> {
        self.store_path
            .clone()
            .or_else(replykit_conversations::default_store_path)
    }
}

/// Check that a key is present and looks like an OpenAI secret key.
pub fn validate_api_key(key: Option<&str>) -> Result<&str> {
    let key = key
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .ok_or_else(|| SuggestionError::Config("API key not set".to_string()))?;

    if !key.starts_with("sk-") {
        return Err(SuggestionError::Config(
            "invalid API key format: expected a key starting with 'sk-'".to_string(),
        ));
    }
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = SuggestionConfig::default();
        assert_eq!(config.model_id, "gpt-3.5-turbo");
        assert_eq!(config.embedding_model, "text-embedding-ada-002");
        assert_eq!(config.suggestion_count(), 3);
        assert_eq!(config.request_timeout(), Duration::from_secs(25));
        assert_eq!(config.temperature_for(false), 0.7);
        assert_eq!(config.temperature_for(true), 1.0);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = SuggestionConfig::from_toml(
            r#"
            writing_style = "lowercase, lots of emojis"
            num_suggestions = 5
            api_style = "responses"
            "#,
        )
        .unwrap();

        assert_eq!(config.writing_style, "lowercase, lots of emojis");
        assert_eq!(config.num_suggestions, 5);
        assert_eq!(config.api_style, ApiStyle::Responses);
        assert_eq!(config.max_output_tokens, 600);
    }

    #[test]
    fn test_load_missing_file_gives_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let config = SuggestionConfig::load(temp_dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.model_id, DEFAULT_MODEL);
    }

    #[test]
    fn test_load_malformed_file_is_config_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        std::fs::write(&path, "num_suggestions = \"many\"").unwrap();

        let err = SuggestionConfig::load(&path).unwrap_err();
        assert!(matches!(err, SuggestionError::Config(_)));
    }

    #[test]
    fn test_env_fallback_only_fills_missing_key() {
        let config = SuggestionConfig::default().with_env_fallback(Some("sk-env".to_string()));
        assert_eq!(config.api_key.as_deref(), Some("sk-env"));

        let config = SuggestionConfig::default()
            .with_api_key("sk-file")
            .with_env_fallback(Some("sk-env".to_string()));
        assert_eq!(config.api_key.as_deref(), Some("sk-file"));
    }

    #[test]
    fn test_credential_validation() {
        assert!(SuggestionConfig::default().credential().is_err());
        assert!(SuggestionConfig::default().with_api_key("  ").credential().is_err());

        let err = SuggestionConfig::default()
            .with_api_key("pk-123")
            .credential()
            .unwrap_err();
        assert!(err.to_string().contains("invalid API key format"));

        let config = SuggestionConfig::default().with_api_key("sk-123");
        assert_eq!(config.credential().unwrap(), "sk-123");
    }

    #[test]
    fn test_suggestion_count_is_clamped() {
        assert_eq!(SuggestionConfig::default().with_num_suggestions(0).suggestion_count(), 1);
        assert_eq!(SuggestionConfig::default().with_num_suggestions(50).suggestion_count(), 10);
    }
}
