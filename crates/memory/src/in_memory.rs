//! In-memory context store - sessions live for the process lifetime.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tidemark_core::context::ContextStore;
use tidemark_core::error::ContextError;
use tidemark_core::message::{Message, Session, SessionId};
use tokio::sync::RwLock;

/// A context store that keeps every session in a map.
///
/// Useful for tests and single-process deployments where losing history on
/// restart is acceptable.
#[derive(Clone)]
pub struct InMemoryContextStore {
    sessions: Arc<RwLock<HashMap<SessionId, Session>>>,
}

impl InMemoryContextStore {
    pub fn new() -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl Default for InMemoryContextStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ContextStore for InMemoryContextStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn get_or_create(&self, id: &SessionId) -> Result<Session, ContextError> {
        if let Some(session) = self.sessions.read().await.get(id) {
            return Ok(session.clone());
        }

        let mut sessions = self.sessions.write().await;
        let session = sessions
            .entry(id.clone())
            .or_insert_with(|| Session::new(id.clone()));
        Ok(session.clone())
    }

    async fn get(&self, id: &SessionId) -> Result<Option<Session>, ContextError> {
        Ok(self.sessions.read().await.get(id).cloned())
    }

    async fn append(&self, id: &SessionId, messages: &[Message]) -> Result<(), ContextError> {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .entry(id.clone())
            .or_insert_with(|| Session::new(id.clone()));
        for message in messages {
            session.push(message.clone());
        }
        Ok(())
    }

    async fn count(&self) -> Result<usize, ContextError> {
        Ok(self.sessions.read().await.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tidemark_core::SessionState;
    use tidemark_core::message::Role;

    #[tokio::test]
    async fn get_or_create_is_idempotent() {
        let store = InMemoryContextStore::new();
        let id = SessionId::from("s1");

        let first = store.get_or_create(&id).await.unwrap();
        let second = store.get_or_create(&id).await.unwrap();
        assert_eq!(first.created_at, second.created_at);
        assert_eq!(first.state(), SessionState::New);
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn append_preserves_order() {
        let store = InMemoryContextStore::new();
        let id = SessionId::from("s1");

        store
            .append(&id, &[Message::user("Hello"), Message::bot("Aloha!")])
            .await
            .unwrap();
        store
            .append(&id, &[Message::user("What about Waikiki?")])
            .await
            .unwrap();

        let session = store.get(&id).await.unwrap().unwrap();
        let roles: Vec<Role> = session.messages.iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::User, Role::Bot, Role::User]);
        assert_eq!(session.messages[2].content, "What about Waikiki?");
        assert_eq!(session.state(), SessionState::Active);
    }

    #[tokio::test]
    async fn sessions_are_isolated() {
        let store = InMemoryContextStore::new();
        store
            .append(&SessionId::from("a"), &[Message::user("one")])
            .await
            .unwrap();

        assert!(store.get(&SessionId::from("b")).await.unwrap().is_none());
        let b = store.get_or_create(&SessionId::from("b")).await.unwrap();
        assert!(b.messages.is_empty());
        assert_eq!(store.count().await.unwrap(), 2);
    }
}
