//! The per-query orchestration pipeline.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tidemark_config::AppConfig;
use tidemark_core::context::ContextStore;
use tidemark_core::error::{Error, ProviderError};
use tidemark_core::evidence::{ConfidenceTier, EvidenceChunk};
use tidemark_core::map::{ActionScope, AgentResponse, GeoBounds, MapAction, MapState};
use tidemark_core::message::{Message, SessionId};
use tidemark_core::provider::{Provider, ProviderRequest};
use tidemark_core::HazardLayer;
use tracing::{debug, info, warn};

use crate::detector::LayerDetector;
use crate::parser::ResponseParser;
use crate::prompt::PromptComposer;
use crate::retriever::Retriever;

/// Used when synthesis returns blank text.
pub const EMPTY_ANSWER: &str = "I wasn't able to put together an answer to that. Could you ask \
     again, perhaps naming a place or a hazard?";

/// Tunables for one [`ClimateAgent`].
#[derive(Debug, Clone)]
pub struct AgentSettings {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
    /// Applied to each generation call separately.
    pub generation_timeout: Duration,
    pub max_actions: usize,
    pub top_k: usize,
    pub min_confidence: ConfidenceTier,
    pub history_window: usize,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            model: "gpt-4o".into(),
            temperature: 0.0,
            max_tokens: Some(2048),
            generation_timeout: Duration::from_secs(60),
            max_actions: 4,
            top_k: 10,
            min_confidence: ConfidenceTier::Medium,
            history_window: 20,
        }
    }
}

impl AgentSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            model: config.default_model.clone(),
            temperature: config.default_temperature,
            max_tokens: Some(config.default_max_tokens),
            generation_timeout: Duration::from_secs(config.agent.generation_timeout_secs),
            max_actions: config.agent.max_actions,
            top_k: config.retrieval.top_k,
            min_confidence: config.retrieval.min_confidence_tier(),
            history_window: config.agent.history_window,
        }
    }
}

/// Everything a query produced, including what the wire response omits.
#[derive(Debug, Clone)]
pub struct QueryOutcome {
    pub response: AgentResponse,
    pub layers: BTreeSet<HazardLayer>,
    pub evidence: Vec<EvidenceChunk>,
    /// Actions the model proposed that failed validation or exceeded the cap.
    pub dropped_actions: usize,
}

/// Answers climate-hazard questions and picks map actions.
///
/// Each query runs context fetch, layer detection, retrieval, synthesis and
/// action selection strictly in sequence. Calls for the same session id are
/// serialised; calls for different sessions run independently.
pub struct ClimateAgent {
    /// Text generation for both stages
    provider: Arc<dyn Provider>,

    /// Evidence lookup
    retriever: Retriever,

    /// Per-session message log
    context: Arc<dyn ContextStore>,

    detector: LayerDetector,
    composer: PromptComposer,
    parser: ResponseParser,
    settings: AgentSettings,

    /// One async lock per session id, held for a whole query. An entry
    /// lives only while some query for that session is running or waiting.
    session_locks: SessionLocks,
}

type SessionLocks = Mutex<HashMap<SessionId, Arc<tokio::sync::Mutex<()>>>>;

/// A claim on one session's lock; drops the map entry with the last claim.
struct SessionLease<'a> {
    locks: &'a SessionLocks,
    id: SessionId,
    lock: Arc<tokio::sync::Mutex<()>>,
}

impl<'a> SessionLease<'a> {
    fn acquire(locks: &'a SessionLocks, id: &SessionId) -> Self {
        let lock = locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(id.clone())
            .or_default()
            .clone();
        Self {
            locks,
            id: id.clone(),
            lock,
        }
    }
}

impl Drop for SessionLease<'_> {
    fn drop(&mut self) {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        // Clones are only taken under this mutex: 2 means the map and us.
        if Arc::strong_count(&self.lock) == 2 {
            locks.remove(&self.id);
        }
    }
}

impl ClimateAgent {
    pub fn new(
        provider: Arc<dyn Provider>,
        retriever: Retriever,
        context: Arc<dyn ContextStore>,
        settings: AgentSettings,
    ) -> Self {
        let composer = PromptComposer::new(
            settings.history_window,
            settings.max_actions,
            GeoBounds::HAWAII,
        );
        Self {
            provider,
            retriever,
            context,
            detector: LayerDetector::default(),
            composer,
            parser: ResponseParser::default(),
            settings,
            session_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn settings(&self) -> &AgentSettings {
        &self.settings
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    pub fn context_store(&self) -> &Arc<dyn ContextStore> {
        &self.context
    }

    /// Answer `query` for `session_id` given the viewer's `map_state`.
    ///
    /// Fails only when the query is empty, the context store fails, or
    /// synthesis generation fails or times out.
    pub async fn process_query(
        &self,
        query: &str,
        map_state: &MapState,
        session_id: &SessionId,
    ) -> Result<AgentResponse, Error> {
        self.run(query, map_state, session_id)
            .await
            .map(|outcome| outcome.response)
    }

    /// Like [`process_query`](Self::process_query), also returning the
    /// detected layers and the evidence used.
    pub async fn run(
        &self,
        query: &str,
        map_state: &MapState,
        session_id: &SessionId,
    ) -> Result<QueryOutcome, Error> {
        let query = query.trim();
        if query.is_empty() {
            return Err(Error::InvalidInput("query must not be empty".into()));
        }

        // Stamped on arrival, before waiting on the session.
        let user_message = Message::user(query);

        let lease = SessionLease::acquire(&self.session_locks, session_id);
        let _guard = lease.lock.lock().await;

        // ── Context ──
        let session = self.context.get_or_create(session_id).await?;
        info!(
            session = %session_id,
            history = session.messages.len(),
            "Processing query"
        );

        // ── Layer detection ──
        let layers = self.detector.detect(query);
        debug!(?layers, "Detected layers");

        // ── Retrieval ──
        let evidence = if layers.is_empty() {
            Vec::new()
        } else {
            self.retriever
                .retrieve(
                    query,
                    self.settings.top_k,
                    Some(&layers),
                    self.settings.min_confidence,
                )
                .await
        };

        // ── Synthesis ──
        let prompt =
            self.composer
                .synthesis_prompt(query, &session.messages, map_state, &evidence);
        debug!(chars = prompt.len(), evidence = evidence.len(), "Synthesis prompt composed");
        let answer = match self.generate(prompt, "synthesis").await? {
            Some(text) => text,
            None => {
                warn!(session = %session_id, "Synthesis returned no text, using fallback");
                EMPTY_ANSWER.to_string()
            }
        };

        // ── Action selection ──
        let (actions, dropped_actions) = if layers.is_empty() {
            (Vec::new(), 0)
        } else {
            self.select_actions(query, &session.messages, map_state, &evidence, &layers)
                .await
        };

        let response = AgentResponse::with_actions(answer, actions);

        self.context
            .append(
                session_id,
                &[user_message, Message::bot(&response.response)],
            )
            .await?;

        info!(
            session = %session_id,
            layers = layers.len(),
            evidence = evidence.len(),
            actions = response.actions().len(),
            "Query complete"
        );

        Ok(QueryOutcome {
            response,
            layers,
            evidence,
            dropped_actions,
        })
    }

    /// Run the action stage. Never fails: any error degrades to no actions.
    async fn select_actions(
        &self,
        query: &str,
        history: &[Message],
        map_state: &MapState,
        evidence: &[EvidenceChunk],
        layers: &BTreeSet<HazardLayer>,
    ) -> (Vec<MapAction>, usize) {
        let prompt = self
            .composer
            .action_prompt(query, history, map_state, evidence, layers);
        debug!(chars = prompt.len(), "Action prompt composed");

        let raw = match self.generate(prompt, "action selection").await {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                warn!("Action selection returned no text, continuing without map actions");
                return (Vec::new(), 0);
            }
            Err(e) => {
                warn!(error = %e, "Action selection failed, continuing without map actions");
                return (Vec::new(), 0);
            }
        };

        let proposed = self.parser.parse(&raw).map_actions.unwrap_or_default();
        let total = proposed.len();
        let scope = ActionScope::new(self.composer.region(), map_state);
        let mut kept = Vec::new();

        for action in proposed {
            match action.validate(&scope) {
                Ok(_) if kept.len() < self.settings.max_actions => kept.push(action),
                Ok(kind) => {
                    warn!(action = %kind, cap = self.settings.max_actions, "Dropping map action over the cap");
                }
                Err(reason) => {
                    warn!(action = %action.action_type, %reason, "Dropping invalid map action");
                }
            }
        }

        let dropped = total - kept.len();
        (kept, dropped)
    }

    /// One generation call under the configured timeout.
    ///
    /// `Ok(None)` means the provider answered with blank text.
    async fn generate(&self, prompt: String, stage: &str) -> Result<Option<String>, ProviderError> {
        let mut request = ProviderRequest::from_prompt(&self.settings.model, prompt)
            .with_temperature(self.settings.temperature);
        if let Some(max_tokens) = self.settings.max_tokens {
            request = request.with_max_tokens(max_tokens);
        }

        let timeout = self.settings.generation_timeout;
        match tokio::time::timeout(timeout, self.provider.complete(request)).await {
            Ok(result) => Ok(result?.text().map(str::to_string)),
            Err(_) => {
                warn!(stage, timeout_secs = timeout.as_secs(), "Generation timed out");
                Err(ProviderError::Timeout(format!(
                    "{stage} after {}s",
                    timeout.as_secs()
                )))
            }
        }
    }
}
