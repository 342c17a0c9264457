//! Conversation memory backed by the SQLite [`Store`].

use std::sync::Arc;

use crate::error::Result;
use crate::openai::ChatMessage;
use crate::storage::Store;

/// Identifies the conversation an agent call belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadRef {
    pub thread_id: String,
    pub resource_id: String,
}

impl ThreadRef {
    pub fn new(thread_id: impl Into<String>, resource_id: impl Into<String>) -> Self {
        Self {
            thread_id: thread_id.into(),
            resource_id: resource_id.into(),
        }
    }
}

/// Replays the last `last_messages` turns of a thread and records new ones.
#[derive(Clone)]
pub struct Memory {
    store: Arc<Store>,
    last_messages: usize,
}

impl Memory {
    pub fn new(store: Arc<Store>, last_messages: usize) -> Self {
        Self {
            store,
            last_messages,
        }
    }

    #[cfg(test)]
    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    /// Prior turns of the thread, oldest first. Creates the thread on first use.
    pub fn history(&self, thread: &ThreadRef) -> Result<Vec<ChatMessage>> {
        self.store
            .ensure_thread(&thread.thread_id, &thread.resource_id)?;
        if self.last_messages == 0 {
            return Ok(Vec::new());
        }
        let messages = self
            .store
            .recent_messages(&thread.thread_id, self.last_messages)?;
        tracing::debug!(
            thread_id = %thread.thread_id,
            recalled = messages.len(),
            "loaded memory history"
        );
        Ok(messages.into_iter().map(ChatMessage::from).collect())
    }

    /// Record one completed exchange.
    pub fn remember(&self, thread: &ThreadRef, prompt: &str, reply: &str) -> Result<()> {
        self.store
            .append_message(&thread.thread_id, &ChatMessage::user(prompt))?;
        self.store
            .append_message(&thread.thread_id, &ChatMessage::assistant(reply))?;
        tracing::debug!(thread_id = %thread.thread_id, "stored exchange in memory");
        Ok(())
    }
}
