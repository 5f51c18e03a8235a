//! Shared test doubles for the pipeline tests.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;
use tidemark_core::context::ContextStore;
use tidemark_core::error::{ContextError, ProviderError, RetrievalError};
use tidemark_core::evidence::{ConfidenceTier, Embedder, EvidenceChunk, VectorQuery, VectorStore};
use tidemark_core::message::{Message, Session, SessionId};
use tidemark_core::provider::{Provider, ProviderRequest, ProviderResponse, Usage};
use tidemark_core::HazardLayer;

/// One scripted provider reply.
#[derive(Debug, Clone)]
pub enum Reply {
    Text(String),
    Error(ProviderError),
    /// Sleep for an hour before answering; pair with a paused clock.
    Hang,
    /// Answer after a short real-time pause.
    Delayed(Duration, String),
}

/// A mock provider that returns a sequence of scripted replies.
///
/// Each call to `complete` pops the next reply and records the request.
/// Panics if more calls are made than replies provided.
pub struct SequentialMockProvider {
    replies: Mutex<VecDeque<Reply>>,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl SequentialMockProvider {
    pub fn new(replies: Vec<Reply>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Replies with each text in turn.
    pub fn texts(texts: &[&str]) -> Self {
        Self::new(texts.iter().map(|t| Reply::Text(t.to_string())).collect())
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    /// The prompt text of every request, in call order.
    pub fn prompts(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|r| {
                r.messages
                    .iter()
                    .map(|m| m.content.as_str())
                    .collect::<Vec<_>>()
                    .join("\n")
            })
            .collect()
    }
}

#[async_trait]
impl Provider for SequentialMockProvider {
    fn name(&self) -> &str {
        "sequential_mock"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let call = {
            let mut requests = self.requests.lock().unwrap();
            requests.push(request);
            requests.len()
        };
        let reply = self.replies.lock().unwrap().pop_front().unwrap_or_else(|| {
            panic!("SequentialMockProvider: no more replies (call #{call})")
        });

        match reply {
            Reply::Text(text) => Ok(make_text_response(&text)),
            Reply::Error(e) => Err(e),
            Reply::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(make_text_response("too late"))
            }
            Reply::Delayed(pause, text) => {
                tokio::time::sleep(pause).await;
                Ok(make_text_response(&text))
            }
        }
    }
}

/// Create a simple text response.
pub fn make_text_response(text: &str) -> ProviderResponse {
    ProviderResponse {
        message: Message::bot(text),
        usage: Some(Usage {
            prompt_tokens: 10,
            completion_tokens: 5,
            total_tokens: 15,
        }),
        model: "mock-model".into(),
    }
}

/// An embedder that always returns the same vector, or always fails.
pub struct FixedEmbedder {
    vector: Option<Vec<f32>>,
}

impl FixedEmbedder {
    pub fn new(vector: Vec<f32>) -> Self {
        Self {
            vector: Some(vector),
        }
    }

    pub fn failing() -> Self {
        Self { vector: None }
    }
}

#[async_trait]
impl Embedder for FixedEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>, RetrievalError> {
        self.vector
            .clone()
            .ok_or_else(|| RetrievalError::EmbeddingFailed("embedder offline".into()))
    }
}

/// A vector store that returns a fixed pool unfiltered and records queries.
pub struct RecordingVectorStore {
    pool: Option<Vec<EvidenceChunk>>,
    queries: Mutex<Vec<VectorQuery>>,
}

impl RecordingVectorStore {
    pub fn new(pool: Vec<EvidenceChunk>) -> Self {
        Self {
            pool: Some(pool),
            queries: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            pool: None,
            queries: Mutex::new(Vec::new()),
        }
    }

    pub fn queries(&self) -> Vec<VectorQuery> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl VectorStore for RecordingVectorStore {
    fn name(&self) -> &str {
        "recording"
    }

    async fn search(&self, query: &VectorQuery) -> Result<Vec<EvidenceChunk>, RetrievalError> {
        self.queries.lock().unwrap().push(query.clone());
        self.pool
            .clone()
            .ok_or_else(|| RetrievalError::Unavailable("connection refused".into()))
    }
}

/// Build a chunk with the given tier, layers and similarity.
pub fn chunk(
    id: &str,
    confidence: ConfidenceTier,
    layers: &[HazardLayer],
    similarity: f32,
) -> EvidenceChunk {
    EvidenceChunk::new(id, format!("Evidence text for {id}."), confidence)
        .with_layers(layers.iter().copied())
        .with_similarity(similarity)
}

/// An in-memory context store that snapshots every session it hands out.
#[derive(Default)]
pub struct RecordingContextStore {
    sessions: Mutex<HashMap<SessionId, Session>>,
    fetched: Mutex<Vec<Session>>,
}

impl RecordingContextStore {
    /// Every session returned by `get_or_create`, as it was at that moment.
    pub fn fetched(&self) -> Vec<Session> {
        self.fetched.lock().unwrap().clone()
    }

    pub fn message_count(&self, id: &SessionId) -> usize {
        self.sessions
            .lock()
            .unwrap()
            .get(id)
            .map_or(0, |s| s.messages.len())
    }
}

#[async_trait]
impl ContextStore for RecordingContextStore {
    fn name(&self) -> &str {
        "recording"
    }

    async fn get_or_create(&self, id: &SessionId) -> Result<Session, ContextError> {
        let session = self
            .sessions
            .lock()
            .unwrap()
            .entry(id.clone())
            .or_insert_with(|| Session::new(id.clone()))
            .clone();
        self.fetched.lock().unwrap().push(session.clone());
        Ok(session)
    }

    async fn get(&self, id: &SessionId) -> Result<Option<Session>, ContextError> {
        Ok(self.sessions.lock().unwrap().get(id).cloned())
    }

    async fn append(&self, id: &SessionId, messages: &[Message]) -> Result<(), ContextError> {
        let mut sessions = self.sessions.lock().unwrap();
        let session = sessions
            .entry(id.clone())
            .or_insert_with(|| Session::new(id.clone()));
        for message in messages {
            session.push(message.clone());
        }
        Ok(())
    }

    async fn count(&self) -> Result<usize, ContextError> {
        Ok(self.sessions.lock().unwrap().len())
    }
}
