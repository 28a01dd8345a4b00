//! Shared result store for processed chat pairs.
//!
//! Workers append one `user`/`assistant` pair per completed task. All
//! mutation and snapshot reads go through a single exclusive lock, so no
//! reader ever observes a half-appended pair. Insertion order is completion
//! order, which under concurrency is not task-index order.

use std::sync::Mutex;

use serde::{Deserialize, Serialize};

/// Role of a chat message in the generated dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// A single `{role, content}` entry in the persisted dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    /// Create a new user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    /// Create a new assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Append-only, lock-protected collection of processed chat messages.
///
/// The store is shared by all workers and by the shutdown controller; it is
/// the only shared mutable state besides the task queue. A `std::sync::Mutex`
/// is sufficient because the lock is never held across an await point.
#[derive(Debug, Default)]
pub struct ResultStore {
    entries: Mutex<Vec<ChatMessage>>,
}

impl ResultStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends the `user` reference and `assistant` answer for one completed
    /// task as a single atomic pair.
    ///
    /// Both messages go in under one lock acquisition so a concurrent
    /// snapshot can never split the pair.
    pub fn append_exchange(&self, reference: impl Into<String>, answer: impl Into<String>) {
        let mut entries = self.entries.lock().expect("result store lock poisoned");
        entries.push(ChatMessage::user(reference));
        entries.push(ChatMessage::assistant(answer));
    }

    /// Returns a consistent copy of the store at the instant of the call.
    pub fn snapshot(&self) -> Vec<ChatMessage> {
        self.entries
            .lock()
            .expect("result store lock poisoned")
            .clone()
    }

    /// Number of messages (two per completed task).
    pub fn len(&self) -> usize {
        self.entries.lock().expect("result store lock poisoned").len()
    }

    /// Returns whether the store holds no messages yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
