//! Conversation records and their legacy on-disk shapes.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use replykit_embeddings::{Embedded, Embedding, Scored};

/// Current time in epoch milliseconds.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// A fan message together with the reply the creator sent for it.
///
/// Records are only stored once they carry an embedding of `fan_message`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationRecord {
    /// The inbound message that was answered.
    pub fan_message: String,

    /// Reply segments, in send order. One logical reply.
    pub creator_responses: Vec<String>,

    /// Vector of `fan_message`.
    pub embedding: Embedding,

    /// Epoch milliseconds; drives recency ordering and eviction.
    pub timestamp: i64,
}

impl ConversationRecord {
    /// Create a record stamped with the current time.
    pub fn new(
        fan_message: impl Into<String>,
        creator_responses: Vec<String>,
        embedding: Embedding,
    ) -> Self {
        Self {
            fan_message: fan_message.into(),
            creator_responses,
            embedding,
            timestamp: now_millis(),
        }
    }

    /// Override the timestamp.
    pub fn with_timestamp(mut self, timestamp: i64) -> Self {
        self.timestamp = timestamp;
        self
    }
}

impl Embedded for ConversationRecord {
    fn embedding(&self) -> &[f32] {
        &self.embedding
    }
}

/// A stored record returned by a similarity query.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RetrievedExample {
    /// The matched record.
    #[serde(flatten)]
    pub record: ConversationRecord,

    /// Cosine similarity to the query message.
    pub similarity: f32,
}

impl From<Scored<&ConversationRecord>> for RetrievedExample {
    fn from(scored: Scored<&ConversationRecord>) -> Self {
        Self {
            record: scored.item.clone(),
            similarity: scored.similarity,
        }
    }
}

/// A record as it arrives from an import file or an older store file.
///
/// Three historical response shapes are accepted: `creatorResponses` (the
/// current array), and a legacy `creatorResponse` holding a string, an
/// array, or an object.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncomingRecord {
    #[serde(default)]
    pub fan_message: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creator_responses: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creator_response: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Embedding>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
}

impl IncomingRecord {
    /// Incoming form of a plain exchange with no embedding or timestamp.
    pub fn new(fan_message: impl Into<String>, creator_responses: Vec<String>) -> Self {
        Self {
            fan_message: fan_message.into(),
            creator_responses: Some(Value::from(creator_responses)),
            ..Self::default()
        }
    }

    /// Attach an embedding.
    pub fn with_embedding(mut self, embedding: Embedding) -> Self {
        self.embedding = Some(embedding);
        self
    }

    /// Attach a timestamp.
    pub fn with_timestamp(mut self, timestamp: i64) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Bring the record to the current shape. The embedding and timestamp
    /// may still be missing afterwards.
    pub fn migrate(self) -> PendingRecord {
        let creator_responses = match (self.creator_responses, self.creator_response) {
            (Some(current), _) => response_segments(current),
            (None, Some(legacy)) => response_segments(legacy),
            (None, None) => Vec::new(),
        };

        PendingRecord {
            fan_message: self.fan_message,
            creator_responses,
            embedding: self.embedding.filter(|e| !e.is_empty()),
            timestamp: self.timestamp,
        }
    }
}

impl From<ConversationRecord> for IncomingRecord {
    fn from(record: ConversationRecord) -> Self {
        Self::new(record.fan_message, record.creator_responses)
            .with_embedding(record.embedding)
            .with_timestamp(record.timestamp)
    }
}

/// A migrated record that may still need an embedding or a timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingRecord {
    pub fan_message: String,
    pub creator_responses: Vec<String>,
    pub embedding: Option<Embedding>,
    pub timestamp: Option<i64>,
}

impl PendingRecord {
    /// Finish the record, stamping `now` when no timestamp was given.
    /// Returns `None` while the embedding is still missing.
    pub fn complete(self, now: i64) -> Option<ConversationRecord> {
        let embedding = self.embedding?;
        Some(ConversationRecord {
            fan_message: self.fan_message,
            creator_responses: self.creator_responses,
            embedding,
            timestamp: self.timestamp.unwrap_or(now),
        })
    }
}

/// Flatten one stored response value into reply segments.
fn response_segments(value: Value) -> Vec<String> {
    match value {
        Value::Null => Vec::new(),
        Value::String(s) => vec![s],
        Value::Array(items) => items.into_iter().filter_map(segment_text).collect(),
        // `{type, messages}` suggestion objects were stored verbatim at one point.
        Value::Object(mut map) => match map.remove("messages") {
            Some(Value::Array(messages)) => messages.into_iter().filter_map(segment_text).collect(),
            Some(other) => segment_text(other).into_iter().collect(),
            None => map.into_iter().filter_map(|(_, v)| segment_text(v)).collect(),
        },
        other => vec![other.to_string()],
    }
}

fn segment_text(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s),
        other => Some(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn parse(json: &str) -> PendingRecord {
        serde_json::from_str::<IncomingRecord>(json).unwrap().migrate()
    }

    #[test]
    fn test_current_shape_passes_through() {
        let pending = parse(
            r#"{"fanMessage": "hi", "creatorResponses": ["hey", "how are you?"], "embedding": [0.5, 0.5], "timestamp": 42}"#,
        );
        assert_eq!(pending.creator_responses, vec!["hey", "how are you?"]);
        assert_eq!(pending.embedding, Some(vec![0.5, 0.5]));
        assert_eq!(pending.timestamp, Some(42));
    }

    #[test]
    fn test_legacy_string_response() {
        let pending = parse(r#"{"fanMessage": "hi", "creatorResponse": "hello you"}"#);
        assert_eq!(pending.creator_responses, vec!["hello you"]);
        assert_eq!(pending.embedding, None);
        assert_eq!(pending.timestamp, None);
    }

    #[test]
    fn test_legacy_object_response_keeps_value_order() {
        let pending = parse(
            r#"{"fanMessage": "hi", "creatorResponse": {"first": "one", "second": "two", "third": "three"}}"#,
        );
        assert_eq!(pending.creator_responses, vec!["one", "two", "three"]);
    }

    #[test]
    fn test_legacy_array_response() {
        let pending = parse(r#"{"fanMessage": "hi", "creatorResponse": ["a", "b"]}"#);
        assert_eq!(pending.creator_responses, vec!["a", "b"]);
    }

    #[test]
    fn test_legacy_suggestion_object() {
        let pending = parse(
            r#"{"fanMessage": "hi", "creatorResponse": {"type": "multi", "messages": ["a", "b"]}}"#,
        );
        assert_eq!(pending.creator_responses, vec!["a", "b"]);
    }

    #[test]
    fn test_missing_response_is_empty() {
        let pending = parse(r#"{"fanMessage": "hi"}"#);
        assert!(pending.creator_responses.is_empty());
    }

    #[test]
    fn test_empty_embedding_counts_as_missing() {
        let pending = parse(r#"{"fanMessage": "hi", "creatorResponse": "x", "embedding": []}"#);
        assert_eq!(pending.embedding, None);
        assert_eq!(pending.complete(1), None);
    }

    #[test]
    fn test_complete_stamps_missing_timestamp() {
        let record = parse(r#"{"fanMessage": "hi", "creatorResponse": "x", "embedding": [1.0]}"#)
            .complete(99)
            .unwrap();
        assert_eq!(record.timestamp, 99);
    }

    #[test]
    fn test_record_serializes_camel_case() {
        let record = ConversationRecord::new("hi", vec!["hey".to_string()], vec![1.0])
            .with_timestamp(7);
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "fanMessage": "hi",
                "creatorResponses": ["hey"],
                "embedding": [1.0],
                "timestamp": 7
            })
        );
    }
}
