//! Error types for suggestion requests.

use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use replykit_embeddings::EmbeddingError;

/// Result type alias for suggestion operations.
pub type Result<T> = std::result::Result<T, SuggestionError>;

/// Errors that can fail a suggestion request.
#[derive(Error, Debug)]
pub enum SuggestionError {
    /// Missing or invalid credential, or an unusable configuration file.
    #[error("{0}")]
    Config(String),

    /// The request itself cannot be answered, e.g. it has no message.
    #[error("{0}")]
    InvalidRequest(String),

    /// The upstream API could not be reached or answered with an error.
    #[error("{message}")]
    Transport {
        status: Option<u16>,
        message: String,
    },

    /// The completion did not arrive before the deadline.
    #[error("request timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    /// The upstream envelope was not in any recognised shape.
    #[error("unexpected response from API: {0}")]
    Parse(String),
}

/// Category of a [`SuggestionError`], as reported to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorKind {
    ConfigError,
    InputError,
    TransportError,
    TimeoutError,
    ParseError,
}

/// Structured failure handed to the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorReport {
    pub kind: ErrorKind,
    pub message: String,
}

impl SuggestionError {
    /// Build a transport error from an HTTP status and message.
    pub fn transport(status: Option<u16>, message: impl Into<String>) -> Self {
        Self::Transport {
            status,
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Config(_) => ErrorKind::ConfigError,
            Self::InvalidRequest(_) => ErrorKind::InputError,
            Self::Transport { .. } => ErrorKind::TransportError,
            Self::Timeout(_) => ErrorKind::TimeoutError,
            Self::Parse(_) => ErrorKind::ParseError,
        }
    }

    /// The `{ kind, message }` form of this error.
    pub fn report(&self) -> ErrorReport {
        ErrorReport {
            kind: self.kind(),
            message: self.to_string(),
        }
    }
}

impl From<EmbeddingError> for SuggestionError {
    fn from(err: EmbeddingError) -> Self {
        match err {
            EmbeddingError::ProviderNotConfigured => {
                Self::Config("API key not set".to_string())
            }
            EmbeddingError::ApiRequest { status, message } => Self::Transport {
                status: Some(status),
                message,
            },
            EmbeddingError::Http(e) => e.into(),
            EmbeddingError::InvalidResponse(message) => Self::Parse(message),
            other => Self::Parse(other.to_string()),
        }
    }
}

impl From<reqwest::Error> for SuggestionError {
    fn from(err: reqwest::Error) -> Self {
        Self::transport(err.status().map(|s| s.as_u16()), err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_report_carries_kind_and_message() {
        let err = SuggestionError::transport(Some(429), "Rate limit reached");
        assert_eq!(
            err.report(),
            ErrorReport {
                kind: ErrorKind::TransportError,
                message: "Rate limit reached".to_string(),
            }
        );
    }

    #[test]
    fn test_report_serializes() {
        let report = SuggestionError::Timeout(Duration::from_secs(25)).report();
        let json = serde_json::to_value(report).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"kind": "TimeoutError", "message": "request timed out after 25s"})
        );
    }

    #[test]
    fn test_embedding_errors_map_to_taxonomy() {
        let config: SuggestionError = EmbeddingError::ProviderNotConfigured.into();
        assert_eq!(config.kind(), ErrorKind::ConfigError);

        let upstream: SuggestionError = EmbeddingError::ApiRequest {
            status: 401,
            message: "Incorrect API key provided".to_string(),
        }
        .into();
        assert_eq!(upstream.kind(), ErrorKind::TransportError);
        assert_eq!(upstream.to_string(), "Incorrect API key provided");

        let parse: SuggestionError = EmbeddingError::InvalidResponse("no data".to_string()).into();
        assert_eq!(parse.kind(), ErrorKind::ParseError);
    }

    #[test]
    fn test_invalid_request_is_not_a_config_error() {
        let report = SuggestionError::InvalidRequest("no message to reply to".to_string()).report();
        assert_eq!(report.kind, ErrorKind::InputError);
        assert_eq!(report.message, "no message to reply to");
    }
}
