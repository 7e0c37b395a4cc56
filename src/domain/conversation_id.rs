//! Type-safe conversation identifier.
//!
//! [`ConversationId`] is a newtype over the application's conversation key
//! so that conversation ids cannot be confused with member ids or broker
//! session ids. It also owns the mapping to the presence channel name.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier of the conversation a connection targets.
///
/// Fixed for the lifetime of a connection: switching conversations always
/// tears the old connection down first.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationId(String);

impl ConversationId {
    /// Creates a `ConversationId` from any string-like key.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the presence channel name for this conversation, e.g.
    /// `presence-conversation.42` for prefix `presence-conversation.`.
    #[must_use]
    pub fn channel_name(&self, prefix: &str) -> String {
        format!("{prefix}{}", self.0)
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<u64> for ConversationId {
    fn from(id: u64) -> Self {
        Self(id.to_string())
    }
}

impl From<&str> for ConversationId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for ConversationId {
    fn from(id: String) -> Self {
        Self(id)
    }
}
