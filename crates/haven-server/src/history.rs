//! In-memory chat message history.
//!
//! Backs `GET/POST /api/chat/messages`: an append-only list with no
//! pagination, gone on restart. Real persistence is a front-end concern in
//! this deployment; the list exists so a freshly opened chat can render
//! recent messages.

use serde_json::Value;
use tokio::sync::RwLock;

/// Append-only message store.
#[derive(Debug, Default)]
pub struct ChatHistory {
    messages: RwLock<Vec<Value>>,
}

impl ChatHistory {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a message and return it as stored.
    pub async fn append(&self, message: Value) -> Value {
        let mut messages = self.messages.write().await;
        messages.push(message.clone());
        message
    }

    /// Snapshot of all stored messages.
    pub async fn all(&self) -> Vec<Value> {
        self.messages.read().await.clone()
    }

    /// Number of stored messages, reported by `/health`.
    pub async fn len(&self) -> usize {
        self.messages.read().await.len()
    }
}
