//! Conversation storage and persistence.
//!
//! The `ConversationStore` owns every record. Records live in a
//! [`SimilarityIndex`] kept newest-first, and are mirrored to a single JSON
//! file when a path is configured. All mutations take the write lock for
//! their whole read-modify-write, including the file write, so concurrent
//! appends and imports never lose each other's updates.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tokio::fs;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use replykit_embeddings::{EmbeddingError, EmbeddingProvider, SimilarityIndex};

use crate::error::{Result, StorageError, StoreError};
use crate::import::{ImportProgress, ImportSummary, merge_records};
use crate::record::{ConversationRecord, IncomingRecord, RetrievedExample, now_millis};

/// Maximum number of records kept.
pub const DEFAULT_CAPACITY: usize = 1000;

/// Number of examples returned by [`ConversationStore::query`].
pub const DEFAULT_TOP_K: usize = 3;

/// Examples must score strictly above this to be returned.
pub const DEFAULT_MIN_SIMILARITY: f32 = 0.7;

/// Default location of the store file.
pub fn default_store_path() -> Option<PathBuf> {
    dirs::data_dir().map(|dir| dir.join("replykit").join("conversations.json"))
}

/// Snapshot of store size and age.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreStats {
    pub conversations: usize,
    pub capacity: usize,
    pub oldest_timestamp: Option<i64>,
    pub newest_timestamp: Option<i64>,
}

/// Bounded, deduplicated store of embedded conversations.
pub struct ConversationStore {
    /// Records, newest first.
    index: RwLock<SimilarityIndex<ConversationRecord>>,

    /// Used to embed query messages and new records.
    embedder: Arc<dyn EmbeddingProvider>,

    /// Backing file, if persistent.
    path: Option<PathBuf>,

    capacity: usize,
    top_k: usize,
    min_similarity: f32,
}

impl ConversationStore {
    /// Create a store that lives only in memory.
    pub fn in_memory(embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            index: RwLock::new(SimilarityIndex::new()),
            embedder,
            path: None,
            capacity: DEFAULT_CAPACITY,
            top_k: DEFAULT_TOP_K,
            min_similarity: DEFAULT_MIN_SIMILARITY,
        }
    }

    /// Open the store backed by `path`, loading and migrating any records
    /// already there. Records without an embedding are dropped on load.
    pub async fn open(path: impl AsRef<Path>, embedder: Arc<dyn EmbeddingProvider>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let records = load_records(&path).await?;

        let mut store = Self::in_memory(embedder);
        store.index = RwLock::new(SimilarityIndex::from_entries(records)?);
        store.path = Some(path);

        info!(
            "Opened conversation store with {} records",
            store.index.get_mut().len()
        );
        Ok(store)
    }

    /// Set the capacity, evicting the oldest records beyond it.
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        self.capacity = capacity;
        let mut kept = 0;
        self.index.get_mut().retain(|_| {
            kept += 1;
            kept <= capacity
        });
        self
    }

    /// Override how many examples a query returns and the score they must beat.
    pub fn with_retrieval(mut self, top_k: usize, min_similarity: f32) -> Self {
        self.top_k = top_k;
        self.min_similarity = min_similarity;
        self
    }

    /// The backing file, if any.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Maximum number of records kept.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of stored records.
    pub async fn len(&self) -> usize {
        self.index.read().await.len()
    }

    /// Whether the store holds no records.
    pub async fn is_empty(&self) -> bool {
        self.index.read().await.is_empty()
    }

    /// Copy of all records, newest first.
    pub async fn records(&self) -> Vec<ConversationRecord> {
        self.index.read().await.entries().to_vec()
    }

    /// Size and age of the store.
    pub async fn stats(&self) -> StoreStats {
        let index = self.index.read().await;
        let entries = index.entries();
        StoreStats {
            conversations: entries.len(),
            capacity: self.capacity,
            oldest_timestamp: entries.iter().map(|r| r.timestamp).min(),
            newest_timestamp: entries.iter().map(|r| r.timestamp).max(),
        }
    }

    /// Insert a record. A stored record for the same fan message is
    /// replaced when this one is newer; the oldest records are evicted past
    /// capacity.
    pub async fn append(&self, record: ConversationRecord) -> Result<()> {
        if record.fan_message.trim().is_empty() {
            return Err(StoreError::InvalidRecord("empty fan message".to_string()));
        }
        if record.embedding.is_empty() {
            return Err(EmbeddingError::MissingEmbedding.into());
        }

        let mut index = self.index.write().await;
        let merged = merge_records(index.entries().to_vec(), vec![record], self.capacity);
        self.persist(&merged).await?;
        index.replace(merged)?;

        debug!("Appended conversation; store now holds {}", index.len());
        Ok(())
    }

    /// Embed `fan_message` and append it with the given reply.
    pub async fn remember(
        &self,
        fan_message: &str,
        creator_responses: Vec<String>,
    ) -> Result<ConversationRecord> {
        let embedding = self.embedder.embed_text(fan_message).await?;
        let record = ConversationRecord::new(fan_message, creator_responses, embedding);
        self.append(record.clone()).await?;
        Ok(record)
    }

    /// Find stored conversations similar to `message`.
    ///
    /// Retrieval is an enhancement: an empty store or a failed embedding
    /// call yields no examples instead of an error.
    pub async fn query(&self, message: &str) -> Vec<RetrievedExample> {
        if message.trim().is_empty() || self.is_empty().await {
            debug!("No stored conversations to search");
            return Vec::new();
        }

        match self.embedder.embed_text(message).await {
            Ok(embedding) => self.query_embedding(&embedding).await,
            Err(e) => {
                warn!("Similar-conversation lookup skipped: {e}");
                Vec::new()
            }
        }
    }

    /// Rank stored conversations against an already computed vector.
    pub async fn query_embedding(&self, embedding: &[f32]) -> Vec<RetrievedExample> {
        let index = self.index.read().await;
        let examples: Vec<RetrievedExample> = index
            .query(embedding, self.top_k, self.min_similarity)
            .into_iter()
            .map(RetrievedExample::from)
            .collect();

        debug!("Found {} similar conversations", examples.len());
        examples
    }

    /// Remove every record.
    pub async fn clear(&self) -> Result<()> {
        let mut index = self.index.write().await;

        if let Some(ref path) = self.path {
            match fs::remove_file(path).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(StorageError::DeleteFile(format!("{}: {e}", path.display())).into());
                }
            }
        }

        index.clear();
        info!("Cleared stored conversations");
        Ok(())
    }

    /// Merge a batch of (possibly legacy-shaped) records into the store.
    ///
    /// Records missing an embedding are embedded one at a time; a failure
    /// drops that record only. `on_progress` is called after every embedding
    /// attempt, and `cancel` is checked between records. A cancelled import
    /// leaves the store untouched.
    pub async fn bulk_merge<F>(
        &self,
        incoming: Vec<IncomingRecord>,
        on_progress: F,
        cancel: &CancellationToken,
    ) -> Result<ImportSummary>
    where
        F: Fn(ImportProgress) + Send + Sync,
    {
        let mut summary = ImportSummary {
            imported_count: incoming.len(),
            ..ImportSummary::default()
        };
        info!("Importing {} conversations", incoming.len());

        let known: HashMap<String, i64> = self
            .index
            .read()
            .await
            .entries()
            .iter()
            .map(|r| (r.fan_message.clone(), r.timestamp))
            .collect();

        let mut pending = Vec::with_capacity(incoming.len());
        for record in incoming {
            let record = record.migrate();
            if record.fan_message.trim().is_empty() {
                summary.dropped_count += 1;
                continue;
            }
            // Would lose the merge anyway; skip it before paying for an embedding.
            if let Some(&stored) = known.get(&record.fan_message)
                && record.timestamp.is_none_or(|ts| ts <= stored)
            {
                summary.superseded_count += 1;
                continue;
            }
            pending.push(record);
        }

        let total = pending.iter().filter(|r| r.embedding.is_none()).count();
        debug!("Conversations needing embeddings: {total}");

        let now = now_millis();
        let mut processed = 0;
        let mut completed = Vec::with_capacity(pending.len());

        for mut record in pending {
            if record.embedding.is_none() {
                if cancel.is_cancelled() {
                    info!("Import cancelled after {processed} of {total} embeddings");
                    return Err(StoreError::Cancelled { processed, total });
                }

                match self.embedder.embed_text(&record.fan_message).await {
                    Ok(embedding) if !embedding.is_empty() => {
                        record.embedding = Some(embedding);
                        summary.embedded_count += 1;
                    }
                    Ok(_) => warn!("Dropping imported conversation: empty embedding"),
                    Err(e) => warn!("Dropping imported conversation: {e}"),
                }

                processed += 1;
                on_progress(ImportProgress::new(
                    processed,
                    total,
                    format!("Generating embeddings: {processed}/{total}"),
                ));
            }

            match record.complete(now) {
                Some(record) => completed.push(record),
                None => summary.dropped_count += 1,
            }
        }

        if total > 0 {
            on_progress(ImportProgress::new(
                processed,
                total,
                format!("Finished generating embeddings for {processed} conversations"),
            ));
        }

        let mut index = self.index.write().await;
        let merged = merge_records(index.entries().to_vec(), completed, self.capacity);
        self.persist(&merged).await?;
        index.replace(merged)?;

        summary.total_conversations = index.len();
        info!(
            "Imported conversations; store now holds {}",
            summary.total_conversations
        );
        Ok(summary)
    }

    /// Write `records` to the backing file, atomically.
    async fn persist(&self, records: &[ConversationRecord]) -> Result<()> {
        let Some(ref path) = self.path else {
            return Ok(());
        };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| StorageError::CreateDirectory(format!("{}: {e}", parent.display())))?;
        }

        let content = serde_json::to_string(records)?;

        // Write atomically using a temp file
        let temp_path = path.with_extension("json.tmp");
        fs::write(&temp_path, &content)
            .await
            .map_err(|e| StorageError::WriteFile(format!("{}: {e}", temp_path.display())))?;

        fs::rename(&temp_path, path)
            .await
            .map_err(|e| StorageError::WriteFile(format!("{}: {e}", path.display())))?;

        debug!("Saved {} conversations to disk", records.len());
        Ok(())
    }
}

/// Load and migrate the store file. A missing file is an empty store.
async fn load_records(path: &Path) -> Result<Vec<ConversationRecord>> {
    let content = match fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(StorageError::ReadFile(format!("{}: {e}", path.display())).into()),
    };

    if content.trim().is_empty() {
        return Ok(Vec::new());
    }

    let incoming: Vec<IncomingRecord> = serde_json::from_str(&content)?;
    let total = incoming.len();
    let now = now_millis();

    let records: Vec<ConversationRecord> = incoming
        .into_iter()
        .map(IncomingRecord::migrate)
        .filter(|r| !r.fan_message.trim().is_empty())
        .filter_map(|r| r.complete(now))
        .collect();

    if records.len() < total {
        warn!(
            "Dropped {} stored conversations without an embedding",
            total - records.len()
        );
    }

    Ok(merge_records(Vec::new(), records, DEFAULT_CAPACITY))
}
