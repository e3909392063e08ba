//! Request and result types shared by the pipeline stages.

use serde::{Deserialize, Serialize};

/// Shape of a suggested reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SuggestionKind {
    /// One message.
    Single,
    /// An ordered burst of short messages sent in sequence.
    Multi,
}

impl SuggestionKind {
    /// Parse a wire tag. Unknown tags yield `None`.
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag.trim().to_ascii_lowercase().as_str() {
            "single" => Some(Self::Single),
            "multi" => Some(Self::Multi),
            _ => None,
        }
    }
}

/// One candidate reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Suggestion {
    /// Legacy payloads use `type`.
    #[serde(alias = "type")]
    pub kind: SuggestionKind,

    /// Text segments, at least one.
    pub messages: Vec<String>,
}

impl Suggestion {
    /// A one-message suggestion.
    pub fn single(text: impl Into<String>) -> Self {
        Self {
            kind: SuggestionKind::Single,
            messages: vec![text.into()],
        }
    }

    /// A burst of messages.
    pub fn multi(messages: Vec<String>) -> Self {
        Self {
            kind: SuggestionKind::Multi,
            messages,
        }
    }

    /// The suggestion's messages joined with newlines, for display.
    pub fn text(&self) -> String {
        self.messages.join("\n")
    }
}

/// Who sent a history turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The fan.
    User,
    /// The creator.
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

/// One message of the chat history, oldest first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: Role,
    pub content: String,
}

impl ChatTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}
