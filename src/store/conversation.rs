//! Conversation state store interface and in-memory implementation.

use std::collections::HashMap;
use std::sync::RwLock;

use anyhow::Result;
use async_trait::async_trait;

use crate::domain::{ConversationId, ConversationState};

/// Persisted conversation state. `save` is atomic per conversation id;
/// the router serializes access per conversation, so implementations only
/// need last-write-wins semantics.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    async fn load(&self, id: &ConversationId) -> Result<Option<ConversationState>>;

    async fn save(&self, state: &ConversationState) -> Result<()>;
}

/// Map-backed store for tests and the CLI simulator
#[derive(Default)]
pub struct InMemoryConversationStore {
    states: RwLock<HashMap<ConversationId, ConversationState>>,
}

impl InMemoryConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored conversations (tests)
    pub fn len(&self) -> usize {
        self.states.read().expect("conversation store poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ConversationStore for InMemoryConversationStore {
    async fn load(&self, id: &ConversationId) -> Result<Option<ConversationState>> {
        Ok(self
            .states
            .read()
            .expect("conversation store poisoned")
            .get(id)
            .cloned())
    }

    async fn save(&self, state: &ConversationState) -> Result<()> {
        self.states
            .write()
            .expect("conversation store poisoned")
            .insert(state.conversation_id.clone(), state.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_load_missing_is_none() {
        let store = InMemoryConversationStore::new();
        let id = ConversationId::new("acme", "u1");
        assert!(store.load(&id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let store = InMemoryConversationStore::new();
        let id = ConversationId::new("acme", "u1");

        let mut state = ConversationState::new(id.clone());
        state.visit("welcome");
        store.save(&state).await.unwrap();

        let loaded = store.load(&id).await.unwrap().unwrap();
        assert_eq!(loaded.current_node.as_deref(), Some("welcome"));
    }

    #[tokio::test]
    async fn test_save_overwrites() {
        let store = InMemoryConversationStore::new();
        let id = ConversationId::new("acme", "u1");

        let mut state = ConversationState::new(id.clone());
        state.visit("welcome");
        store.save(&state).await.unwrap();

        state.visit("book_date");
        store.save(&state).await.unwrap();

        let loaded = store.load(&id).await.unwrap().unwrap();
        assert_eq!(loaded.current_node.as_deref(), Some("book_date"));
        assert_eq!(store.len(), 1);
    }
}
