//! # Embeddings
//!
//! Semantic embedding generation and similarity search for the reply
//! suggestion pipeline.
//!
//! ## Features
//!
//! - **Embedding Generation**: Convert text to dense vectors through a remote API
//! - **Similarity Search**: Rank stored items against a query vector
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    Embeddings System                            │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  EmbeddingProvider ──► Embedding ──► SimilarityIndex<T>        │
//! │       │                                   │                     │
//! │       ▼                                   ▼                     │
//! │  OpenAIProvider                   cosine_similarity / top-k     │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod error;
pub mod index;
pub mod provider;
pub mod similarity;

pub use error::{EmbeddingError, Result};
pub use index::{Embedded, Scored, SimilarityIndex};
pub use provider::{EmbeddingProvider, EmbeddingRequest, EmbeddingResponse, OpenAIProvider};
pub use similarity::cosine_similarity;

/// A dense vector embedding.
pub type Embedding = Vec<f32>;

/// Model used when none is configured.
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-ada-002";
