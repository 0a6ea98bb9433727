//! Session transcript
//!
//! Insertion-ordered and append-only: entries are never edited. The only
//! removal is rolling back an optimistic local append whose send failed.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Author of a transcript entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The local participant
    User,
    /// The remote agent
    Assistant,
}

impl Role {
    /// Derive the role from the sender identity
    #[must_use]
    pub fn from_sender(sender: &str, local_identity: &str) -> Self {
        if sender == local_identity {
            Self::User
        } else {
            Self::Assistant
        }
    }
}

/// A single transcript entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Message {
    /// Unique per session
    pub id: String,
    /// Author
    pub role: Role,
    /// Text content
    pub content: String,
    /// When the entry was created
    pub timestamp: DateTime<Utc>,
}

impl Message {
    /// Create an entry with a fresh id and the current time
    #[must_use]
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Ordered list of messages for one session
#[derive(Debug, Clone, Default)]
pub struct Transcript {
    messages: Vec<Message>,
}

impl Transcript {
    /// Create an empty transcript
    #[must_use]
    pub const fn new() -> Self {
        Self {
            messages: Vec::new(),
        }
    }

    /// Append an entry
    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// Remove the entry with the given id, returning it
    pub fn remove(&mut self, id: &str) -> Option<Message> {
        let index = self.messages.iter().position(|m| m.id == id)?;
        Some(self.messages.remove(index))
    }

    /// All entries in insertion order
    #[must_use]
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Number of entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Whether the transcript has no entries
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Drop every entry (session end)
    pub fn clear(&mut self) {
        self.messages.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_follows_local_identity() {
        assert_eq!(Role::from_sender("me", "me"), Role::User);
        assert_eq!(Role::from_sender("agent", "me"), Role::Assistant);
    }

    #[test]
    fn ids_are_unique() {
        let a = Message::new(Role::User, "hi");
        let b = Message::new(Role::User, "hi");
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn remove_keeps_order_of_the_rest() {
        let mut transcript = Transcript::new();
        let first = Message::new(Role::User, "one");
        let second = Message::new(Role::Assistant, "two");
        let third = Message::new(Role::User, "three");
        let second_id = second.id.clone();
        transcript.push(first);
        transcript.push(second);
        transcript.push(third);

        let removed = transcript.remove(&second_id).unwrap();
        assert_eq!(removed.content, "two");
        let contents: Vec<_> = transcript.messages().iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, ["one", "three"]);
        assert!(transcript.remove(&second_id).is_none());
    }
}
