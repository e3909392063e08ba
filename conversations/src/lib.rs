//! # Conversations
//!
//! Bounded, deduplicated store of past fan/creator exchanges, each carrying
//! an embedding of the fan message so that similar exchanges can be
//! retrieved as few-shot examples.
//!
//! - At most one record per fan message; the most recent one wins.
//! - At most [`DEFAULT_CAPACITY`] records; the oldest are evicted first.
//! - Older file shapes (`creatorResponse` as a string, array, or object) are
//!   migrated on load and on import.

pub mod error;
pub mod import;
pub mod record;
pub mod store;

pub use error::{Result, StorageError, StoreError};
pub use import::{ImportProgress, ImportSummary};
pub use record::{ConversationRecord, IncomingRecord, PendingRecord, RetrievedExample, now_millis};
pub use store::{
    ConversationStore, DEFAULT_CAPACITY, DEFAULT_MIN_SIMILARITY, DEFAULT_TOP_K, StoreStats,
    default_store_path,
};
