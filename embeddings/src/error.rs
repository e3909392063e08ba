//! Error types for the embeddings system.

use thiserror::Error;

/// Result type alias for embedding operations.
pub type Result<T> = std::result::Result<T, EmbeddingError>;

/// Errors that can occur in the embeddings system.
#[derive(Error, Debug)]
pub enum EmbeddingError {
    /// No API credential configured.
    #[error("embedding provider not configured: API key not set")]
    ProviderNotConfigured,

    /// Empty text was passed for embedding.
    #[error("cannot embed empty text")]
    EmptyInput,

    /// The API answered with a non-success status.
    #[error("embedding request failed ({status}): {message}")]
    ApiRequest { status: u16, message: String },

    /// The API answered, but without the expected vector.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// An index entry was offered without a vector.
    #[error("entry has no embedding")]
    MissingEmbedding,

    /// Dimension mismatch.
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Network-level failure.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}

impl EmbeddingError {
    /// Upstream HTTP status, when the failure carried one.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::ApiRequest { status, .. } => Some(*status),
            Self::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}
