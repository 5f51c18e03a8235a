//! SQLite context store.
//!
//! Uses a single SQLite database file with two tables:
//! - `sessions` - one row per session id
//! - `messages` - the ordered message log, keyed by an autoincrement
//!   sequence so insertion order survives identical timestamps
//!
//! Appends run inside one transaction, so a turn's user and bot messages
//! land together or not at all.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use tidemark_core::context::ContextStore;
use tidemark_core::error::ContextError;
use tidemark_core::message::{Message, Role, Session, SessionId};
use tracing::{debug, info, warn};

/// A durable context store on SQLite.
pub struct SqliteContextStore {
    pool: SqlitePool,
}

impl SqliteContextStore {
    /// Open (or create) a database at `path`.
    ///
    /// Pass `"sqlite::memory:"` for an in-process ephemeral database (useful for tests).
    pub async fn new(path: &str) -> Result<Self, ContextError> {
        let options = SqliteConnectOptions::from_str(path)
            .map_err(|e| ContextError::Storage(format!("Invalid SQLite path: {e}")))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .pragma("foreign_keys", "ON");

        // A single connection keeps `sqlite::memory:` databases shared.
        let max_connections = if path.contains(":memory:") { 1 } else { 4 };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .map_err(|e| ContextError::Storage(format!("Failed to open SQLite: {e}")))?;

        let store = Self { pool };
        store.run_migrations().await?;
        info!("SQLite context store initialized at {path}");
        Ok(store)
    }

    /// Create from an existing pool (useful for testing).
    pub async fn from_pool(pool: SqlitePool) -> Result<Self, ContextError> {
        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    async fn run_migrations(&self) -> Result<(), ContextError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sessions (
                id          TEXT PRIMARY KEY,
                created_at  TEXT NOT NULL,
                updated_at  TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| ContextError::MigrationFailed(format!("sessions table: {e}")))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS messages (
                seq         INTEGER PRIMARY KEY AUTOINCREMENT,
                id          TEXT UNIQUE NOT NULL,
                session_id  TEXT NOT NULL REFERENCES sessions(id),
                role        TEXT NOT NULL,
                content     TEXT NOT NULL,
                timestamp   TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| ContextError::MigrationFailed(format!("messages table: {e}")))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_messages_session ON messages(session_id, seq)",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| ContextError::MigrationFailed(format!("session index: {e}")))?;

        debug!("SQLite migrations complete");
        Ok(())
    }

    async fn load(&self, id: &SessionId) -> Result<Option<Session>, ContextError> {
        let row = sqlx::query("SELECT created_at, updated_at FROM sessions WHERE id = ?1")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| ContextError::QueryFailed(format!("session lookup: {e}")))?;

        let Some(row) = row else {
            return Ok(None);
        };

        let created_at = parse_time(&row, "created_at")?;
        let updated_at = parse_time(&row, "updated_at")?;

        let rows = sqlx::query(
            "SELECT id, role, content, timestamp FROM messages WHERE session_id = ?1 ORDER BY seq",
        )
        .bind(id.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| ContextError::QueryFailed(format!("message scan: {e}")))?;

        let messages = rows
            .iter()
            .map(row_to_message)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Some(Session {
            id: id.clone(),
            messages,
            created_at,
            updated_at,
        }))
    }
}

fn parse_time(row: &sqlx::sqlite::SqliteRow, column: &str) -> Result<DateTime<Utc>, ContextError> {
    let raw: String = row
        .try_get(column)
        .map_err(|e| ContextError::QueryFailed(format!("{column} column: {e}")))?;
    Ok(DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| {
            warn!(column, value = %raw, "Unparsable timestamp, using now");
            Utc::now()
        }))
}

fn row_to_message(row: &sqlx::sqlite::SqliteRow) -> Result<Message, ContextError> {
    let id: String = row
        .try_get("id")
        .map_err(|e| ContextError::QueryFailed(format!("id column: {e}")))?;
    let role: String = row
        .try_get("role")
        .map_err(|e| ContextError::QueryFailed(format!("role column: {e}")))?;
    let content: String = row
        .try_get("content")
        .map_err(|e| ContextError::QueryFailed(format!("content column: {e}")))?;

    let role = match role.as_str() {
        "USER" => Role::User,
        "BOT" => Role::Bot,
        other => {
            return Err(ContextError::QueryFailed(format!("unknown role '{other}'")));
        }
    };

    Ok(Message {
        id,
        role,
        content,
        timestamp: parse_time(row, "timestamp")?,
    })
}

#[async_trait]
impl ContextStore for SqliteContextStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn get_or_create(&self, id: &SessionId) -> Result<Session, ContextError> {
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            "INSERT INTO sessions (id, created_at, updated_at) VALUES (?1, ?2, ?2) \
             ON CONFLICT(id) DO NOTHING",
        )
        .bind(id.as_str())
        .bind(&now)
        .execute(&self.pool)
        .await
        .map_err(|e| ContextError::Storage(format!("session upsert: {e}")))?;

        self.load(id)
            .await?
            .ok_or_else(|| ContextError::Storage(format!("session {id} vanished after upsert")))
    }

    async fn get(&self, id: &SessionId) -> Result<Option<Session>, ContextError> {
        self.load(id).await
    }

    async fn append(&self, id: &SessionId, messages: &[Message]) -> Result<(), ContextError> {
        let now = Utc::now().to_rfc3339();
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| ContextError::Storage(format!("begin: {e}")))?;

        sqlx::query(
            "INSERT INTO sessions (id, created_at, updated_at) VALUES (?1, ?2, ?2) \
             ON CONFLICT(id) DO UPDATE SET updated_at = excluded.updated_at",
        )
        .bind(id.as_str())
        .bind(&now)
        .execute(&mut *tx)
        .await
        .map_err(|e| ContextError::Storage(format!("session upsert: {e}")))?;

        for message in messages {
            sqlx::query(
                "INSERT INTO messages (id, session_id, role, content, timestamp) \
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )
            .bind(&message.id)
            .bind(id.as_str())
            .bind(message.role.as_str())
            .bind(&message.content)
            .bind(message.timestamp.to_rfc3339())
            .execute(&mut *tx)
            .await
            .map_err(|e| ContextError::Storage(format!("message insert: {e}")))?;
        }

        tx.commit()
            .await
            .map_err(|e| ContextError::Storage(format!("commit: {e}")))?;

        debug!(session = %id, count = messages.len(), "Appended messages");
        Ok(())
    }

    async fn count(&self) -> Result<usize, ContextError> {
        let row = sqlx::query("SELECT COUNT(*) AS cnt FROM sessions")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| ContextError::QueryFailed(format!("count: {e}")))?;
        let count: i64 = row
            .try_get("cnt")
            .map_err(|e| ContextError::QueryFailed(format!("cnt column: {e}")))?;
        Ok(count as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tidemark_core::SessionState;

    async fn test_store() -> SqliteContextStore {
        SqliteContextStore::new("sqlite::memory:").await.unwrap()
    }

    #[tokio::test]
    async fn get_or_create_is_idempotent() {
        let store = test_store().await;
        let id = SessionId::from("s1");

        let first = store.get_or_create(&id).await.unwrap();
        let second = store.get_or_create(&id).await.unwrap();
        assert_eq!(first.state(), SessionState::New);
        assert_eq!(first.created_at, second.created_at);
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn append_round_trips_in_order() {
        let store = test_store().await;
        let id = SessionId::from("s1");

        let hello = Message::user("Hello");
        let reply = Message::bot("Aloha! Ask me about sea level rise.");
        store.append(&id, &[hello.clone(), reply.clone()]).await.unwrap();
        store
            .append(&id, &[Message::user("What about Waikiki?")])
            .await
            .unwrap();

        let session = store.get(&id).await.unwrap().unwrap();
        assert_eq!(session.messages.len(), 3);
        assert_eq!(session.messages[0].id, hello.id);
        assert_eq!(session.messages[0].role, Role::User);
        assert_eq!(session.messages[1].content, reply.content);
        assert_eq!(session.messages[1].role, Role::Bot);
        assert_eq!(session.messages[2].content, "What about Waikiki?");
    }

    #[tokio::test]
    async fn unknown_session_is_none() {
        let store = test_store().await;
        assert!(store.get(&SessionId::from("ghost")).await.unwrap().is_none());
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn history_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = format!("sqlite://{}", dir.path().join("sessions.db").display());
        let id = SessionId::from("durable");

        {
            let store = SqliteContextStore::new(&path).await.unwrap();
            store
                .append(&id, &[Message::user("Will Kailua flood?"), Message::bot("Parts may.")])
                .await
                .unwrap();
        }

        let reopened = SqliteContextStore::new(&path).await.unwrap();
        let session = reopened.get(&id).await.unwrap().unwrap();
        assert_eq!(session.messages.len(), 2);
        assert_eq!(session.state(), SessionState::Active);
    }
}
