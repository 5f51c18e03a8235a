//! ContextStore trait - the per-session conversation log.
//!
//! Sessions are append-only: messages are never reordered or removed.
//! Implementations: in-memory (process lifetime), SQLite (durable).

use crate::error::ContextError;
use crate::message::{Message, Session, SessionId};
use async_trait::async_trait;

#[async_trait]
pub trait ContextStore: Send + Sync {
    /// The backend name (e.g., "memory", "sqlite").
    fn name(&self) -> &str;

    /// Fetch a session, creating an empty one for an unseen id.
    ///
    /// Idempotent: calling it twice never creates two sessions.
    async fn get_or_create(&self, id: &SessionId) -> std::result::Result<Session, ContextError>;

    /// Fetch a session without creating it.
    async fn get(&self, id: &SessionId) -> std::result::Result<Option<Session>, ContextError>;

    /// Append messages in order, as one unit.
    ///
    /// Creates the session if it does not exist yet.
    async fn append(
        &self,
        id: &SessionId,
        messages: &[Message],
    ) -> std::result::Result<(), ContextError>;

    /// Number of sessions currently held.
    async fn count(&self) -> std::result::Result<usize, ContextError>;
}
