//! Storage adapters for tidemark.
//!
//! Session context stores (conversation history) and evidence stores
//! (vector similarity search over curated source chunks).

pub mod in_memory;
pub mod noop;
pub mod vector;

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "postgres")]
pub mod postgres;

pub use in_memory::InMemoryContextStore;
pub use noop::NoopVectorStore;
pub use vector::{CorpusRecord, InMemoryVectorStore, cosine_similarity};

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteContextStore;

#[cfg(feature = "postgres")]
pub use postgres::PgVectorStore;
