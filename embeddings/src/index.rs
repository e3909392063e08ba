//! Similarity index over embedded entries.
//!
//! The index owns its entries and answers k-nearest-neighbour queries with
//! a linear cosine scan. It is meant for small, bounded collections (a few
//! thousand entries at most), so no approximate structure is kept.

use tracing::debug;

use crate::error::{EmbeddingError, Result};
use crate::similarity::find_top_k;

/// Anything carrying an embedding vector.
pub trait Embedded {
    /// The entry's vector. Empty means "not embedded yet".
    fn embedding(&self) -> &[f32];
}

/// A query hit: an entry plus its similarity to the query vector.
#[derive(Debug, Clone, PartialEq)]
pub struct Scored<T> {
    /// The matched entry.
    pub item: T,

    /// Cosine similarity in [-1, 1].
    pub similarity: f32,
}

impl<T: Clone> Scored<&T> {
    /// Detach the hit from the index it borrows.
    pub fn cloned(&self) -> Scored<T> {
        Scored {
            item: self.item.clone(),
            similarity: self.similarity,
        }
    }
}

/// A similarity index for vector lookups.
///
/// Entries keep their insertion order, which is also the tie-break order
/// for equal similarity scores.
#[derive(Debug, Clone)]
pub struct SimilarityIndex<T> {
    /// Stored entries.
    entries: Vec<T>,
}

impl<T> Default for SimilarityIndex<T> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<T: Embedded> SimilarityIndex<T> {
    /// Create an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an index from existing entries.
    pub fn from_entries(entries: Vec<T>) -> Result<Self> {
        let mut index = Self::new();
        index.insert_many(entries)?;
        Ok(index)
    }

    /// Add one entry.
    pub fn insert(&mut self, entry: T) -> Result<()> {
        if entry.embedding().is_empty() {
            return Err(EmbeddingError::MissingEmbedding);
        }
        self.entries.push(entry);
        Ok(())
    }

    /// Add several entries. Nothing is inserted if any entry lacks an
    /// embedding. No deduplication happens here.
    pub fn insert_many(&mut self, entries: impl IntoIterator<Item = T>) -> Result<usize> {
        let entries: Vec<T> = entries.into_iter().collect();
        if entries.iter().any(|e| e.embedding().is_empty()) {
            return Err(EmbeddingError::MissingEmbedding);
        }

        let count = entries.len();
        self.entries.extend(entries);
        debug!("Inserted {count} entries into similarity index");
        Ok(count)
    }

    /// Return up to `k` entries with similarity strictly above
    /// `min_similarity`, most similar first.
    pub fn query(&self, query: &[f32], k: usize, min_similarity: f32) -> Vec<Scored<&T>> {
        if self.entries.is_empty() || k == 0 {
            return Vec::new();
        }
        find_top_k(query, &self.entries, k, min_similarity)
    }

    /// Get the number of entries in the index.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the index is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Borrow all entries in index order.
    pub fn entries(&self) -> &[T] {
        &self.entries
    }

    /// Keep only the entries matching `keep`.
    pub fn retain(&mut self, keep: impl FnMut(&T) -> bool) {
        self.entries.retain(keep);
    }

    /// Replace all entries at once (e.g. after a merge).
    pub fn replace(&mut self, entries: Vec<T>) -> Result<()> {
        if entries.iter().any(|e| e.embedding().is_empty()) {
            return Err(EmbeddingError::MissingEmbedding);
        }
        self.entries = entries;
        Ok(())
    }

    /// Clear the index.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Take the entries out of the index.
    pub fn into_entries(self) -> Vec<T> {
        self.entries
    }
}
