//! # Suggestions
//!
//! Retrieval-grounded reply suggestions for a creator answering fan
//! messages.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                       SuggestionService                          │
//! ├──────────────────────────────────────────────────────────────────┤
//! │  ConversationStore ──► PromptBuilder ──► CompletionClient        │
//! │   (similar examples)    (instructions)     (raw model text)      │
//! │                                                 │                │
//! │                                                 ▼                │
//! │                  store.remember ◄── parser::parse ──► Suggestion │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use replykit_suggestions::{SuggestionConfig, SuggestionRequest, SuggestionService};
//!
//! let config = SuggestionConfig::load("config.toml")?;
//! let service = SuggestionService::from_config(config).await?;
//!
//! let suggestions = service.suggest(&SuggestionRequest::new("hey, what are you up to?")).await?;
//! for suggestion in suggestions {
//!     println!("{}", suggestion.text());
//! }
//! ```

pub mod completion;
pub mod config;
pub mod error;
pub mod parser;
pub mod prompt;
pub mod service;
pub mod types;

pub use completion::{CompletionClient, OpenAIChatClient, Sampling};
pub use config::{ApiStyle, SuggestionConfig, default_config_path};
pub use error::{ErrorKind, ErrorReport, Result, SuggestionError};
pub use parser::parse;
pub use prompt::{Prompt, PromptBuilder};
pub use service::{RequestState, SuggestionRequest, SuggestionService};
pub use types::{ChatTurn, Role, Suggestion, SuggestionKind};
