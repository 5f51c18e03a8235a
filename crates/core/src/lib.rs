//! # Tidemark Core
//!
//! Domain types, collaborator traits, and error definitions for the tidemark
//! climate assistant. This crate has **no framework dependencies** - it
//! defines the model every other crate implements against.
//!
//! ## Design Philosophy
//!
//! Every external collaborator (text generation, embeddings, vector search,
//! session storage) is a trait here. Implementations live in their own crates,
//! so the orchestration pipeline can be wired with real backends in production
//! and scripted doubles in tests, with no global state in between.

pub mod context;
pub mod error;
pub mod evidence;
pub mod layer;
pub mod map;
pub mod message;
pub mod provider;

// Re-export key types at crate root for ergonomics
pub use context::ContextStore;
pub use error::{ContextError, Error, ProviderError, Result, RetrievalError};
pub use evidence::{
    ConfidenceTier, Embedder, EvidenceChunk, VectorQuery, VectorStore, rank_order,
};
pub use layer::{HazardLayer, LayerCategory};
pub use map::{
    ActionScope, AgentResponse, DEFAULT_BASEMAPS, GeoBounds, LatLng, MapAction, MapActionKind,
    MapState,
};
pub use message::{Message, Role, Session, SessionId, SessionState};
pub use provider::{
    EmbeddingRequest, EmbeddingResponse, Provider, ProviderRequest, ProviderResponse, Usage,
};
