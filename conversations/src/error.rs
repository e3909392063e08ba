//! Error types for the conversation store.

use thiserror::Error;

use replykit_embeddings::EmbeddingError;

/// Result type alias for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors that can occur in the conversation store.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Embedding generation or index validation failed.
    #[error("embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    /// Storage operation failed.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A record could not be accepted.
    #[error("invalid record: {0}")]
    InvalidRecord(String),

    /// A bulk import was cancelled before it completed.
    #[error("import cancelled after {processed} of {total} records")]
    Cancelled { processed: usize, total: usize },
}

/// Storage-specific errors.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Failed to create storage directory.
    #[error("failed to create directory: {0}")]
    CreateDirectory(String),

    /// Failed to read the store file.
    #[error("failed to read file: {0}")]
    ReadFile(String),

    /// Failed to write the store file.
    #[error("failed to write file: {0}")]
    WriteFile(String),

    /// Failed to delete the store file.
    #[error("failed to delete file: {0}")]
    DeleteFile(String),
}
