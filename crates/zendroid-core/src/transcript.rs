use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatKind {
    User,
    Agent,
    System,
    Error,
}

impl ChatKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Agent => "agent",
            Self::System => "system",
            Self::Error => "error",
        }
    }
}

/// One narrated line. Immutable once appended.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatEntry {
    pub kind: ChatKind,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

impl ChatEntry {
    pub fn new(kind: ChatKind, text: impl Into<String>) -> Self {
        Self {
            kind,
            text: text.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Append-only log in arrival order. Arrival order is authoritative, not
/// entry timestamps.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ChatTranscript {
    entries: Vec<ChatEntry>,
}

impl ChatTranscript {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&mut self, kind: ChatKind, text: impl Into<String>) {
        self.entries.push(ChatEntry::new(kind, text));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[ChatEntry] {
        &self.entries
    }

    pub fn get(&self, index: usize) -> Option<&ChatEntry> {
        self.entries.get(index)
    }

    /// Entries appended at or after `index`. Used by renderers that remember
    /// how far they have drawn.
    pub fn since(&self, index: usize) -> &[ChatEntry] {
        self.entries.get(index..).unwrap_or(&[])
    }

    pub fn last(&self) -> Option<&ChatEntry> {
        self.entries.last()
    }
}
