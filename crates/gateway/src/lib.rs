//! HTTP boundary for tidemark.
//!
//! Exposes `POST /chat` for conversational turns and `GET /health` for
//! liveness checks. Built on Axum; every request runs as its own task on
//! the multi-threaded runtime.

pub mod bootstrap;
pub mod chat;

use axum::extract::DefaultBodyLimit;
use axum::{
    Router,
    http::{HeaderName, HeaderValue, Method, header},
    response::Json,
    routing::{get, post},
};
use serde::Serialize;
use std::sync::Arc;
use tidemark_agent::ClimateAgent;
use tidemark_config::AppConfig;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::{info, warn};

pub use bootstrap::build_agent;
pub use chat::{ActionShape, ApiError, ChatRequest, ChatResponse, FieldError};

/// Shared application state for the gateway.
pub struct GatewayState {
    pub agent: Arc<ClimateAgent>,
}

pub type SharedState = Arc<GatewayState>;

/// Build the router with all routes and middleware.
///
/// Layers applied:
/// - CORS restricted to `cors_origins` (any origin when empty)
/// - Request body size limit (1 MB)
/// - HTTP trace logging
pub fn build_router(state: SharedState, cors_origins: &[String]) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/chat", post(chat::chat_handler))
        .with_state(state)
        .layer(DefaultBodyLimit::max(1024 * 1024))
        .layer(cors_layer(cors_origins))
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let allow_origin = if origins.is_empty() {
        AllowOrigin::any()
    } else {
        let parsed: Vec<HeaderValue> = origins
            .iter()
            .filter_map(|origin| match origin.parse() {
                Ok(value) => Some(value),
                Err(_) => {
                    warn!(origin = %origin, "Ignoring invalid CORS origin");
                    None
                }
            })
            .collect();
        AllowOrigin::list(parsed)
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            header::CONTENT_TYPE,
            HeaderName::from_static(chat::SESSION_HEADER),
        ])
        .max_age(std::time::Duration::from_secs(3600))
}

/// Start the gateway HTTP server.
pub async fn start(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let addr = format!("{}:{}", config.gateway.host, config.gateway.port);

    let agent = Arc::new(build_agent(&config).await?);
    let app = build_router(Arc::new(GatewayState { agent }), &config.gateway.cors_origins);

    info!(addr = %addr, "Gateway listening");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// --- Handlers ---

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    service: &'static str,
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        service: "tidemark",
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use serde_json::{Value, json};
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use tidemark_agent::{AgentSettings, Retriever};
    use tidemark_core::context::ContextStore;
    use tidemark_core::error::{ProviderError, RetrievalError};
    use tidemark_core::evidence::Embedder;
    use tidemark_core::message::{Message, SessionId};
    use tidemark_core::provider::{Provider, ProviderRequest, ProviderResponse};
    use tidemark_memory::{InMemoryContextStore, NoopVectorStore};
    use tower::ServiceExt;

    /// Replies with scripted texts in order; fails once they run out.
    struct ScriptedProvider {
        replies: Mutex<VecDeque<String>>,
    }

    impl ScriptedProvider {
        fn new(replies: &[&str]) -> Self {
            Self {
                replies: Mutex::new(replies.iter().map(|s| s.to_string()).collect()),
            }
        }
    }

    #[async_trait]
    impl Provider for ScriptedProvider {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn complete(
            &self,
            _request: ProviderRequest,
        ) -> Result<ProviderResponse, ProviderError> {
            let text = self.replies.lock().unwrap().pop_front().ok_or_else(|| {
                ProviderError::ApiError {
                    status_code: 503,
                    message: "upstream unavailable".into(),
                }
            })?;
            Ok(ProviderResponse {
                message: Message::bot(text),
                usage: None,
                model: "scripted-model".into(),
            })
        }
    }

    struct ZeroEmbedder;

    #[async_trait]
    impl Embedder for ZeroEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>, RetrievalError> {
            Ok(vec![0.0; 4])
        }
    }

    fn test_state(replies: &[&str]) -> SharedState {
        let retriever = Retriever::new(Arc::new(ZeroEmbedder), Arc::new(NoopVectorStore));
        let agent = ClimateAgent::new(
            Arc::new(ScriptedProvider::new(replies)),
            retriever,
            Arc::new(InMemoryContextStore::new()),
            AgentSettings::default(),
        );
        Arc::new(GatewayState {
            agent: Arc::new(agent),
        })
    }

    fn chat_body(query: &str) -> Value {
        json!({
            "query": query,
            "map_state": {
                "active_layers": [],
                "available_layers": ["CRC:HI_State_80prob_03ft_GWI"],
                "foot_increment": 3,
                "bounds": {"southwest": [21.25, -157.95], "northeast": [21.45, -157.65]},
                "zoom_level": 11,
                "basemap_name": "light",
                "available_basemaps": ["light", "satellite", "hybrid"]
            }
        })
    }

    fn post_chat(body: String, session: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri("/chat")
            .header("content-type", "application/json");
        if let Some(session) = session {
            builder = builder.header("X-Session-Id", session);
        }
        builder.body(Body::from(body)).unwrap()
    }

    async fn json_body(response: axum::response::Response) -> Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn health_endpoint() {
        let app = build_router(test_state(&[]), &[]);
        let req = Request::builder().uri("/health").body(Body::empty()).unwrap();

        let response = app.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = json_body(response).await;
        assert_eq!(json["status"], "ok");
        assert_eq!(json["service"], "tidemark");
    }

    #[tokio::test]
    async fn chat_without_layers_returns_created() {
        let app = build_router(test_state(&["Aloha! Ask me about flooding on Oahu."]), &[]);
        let response = app
            .oneshot(post_chat(chat_body("Hello").to_string(), None))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::CREATED);
        let json = json_body(response).await;
        assert_eq!(json["response"], "Aloha! Ask me about flooding on Oahu.");
        assert!(json["map_actions"].is_null());
    }

    #[tokio::test]
    async fn chat_with_layers_returns_actions() {
        let actions = json!({
            "response": "Showing 3 ft groundwater inundation.",
            "map_actions": [
                {"type": "add_layer", "parameters": {"layer_name": "CRC:HI_State_80prob_03ft_GWI"}},
                {"type": "set_bounds", "parameters": {
                    "bounds": {"southwest": [21.309, -157.9], "northeast": [21.65, -157.65]}
                }}
            ]
        })
        .to_string();
        let state = test_state(&["Kaneohe Bay's shoreline sees groundwater emerge first.", &actions]);
        let app = build_router(state, &[]);

        let response = app
            .oneshot(post_chat(
                chat_body("show me 3 feet of flooding in Koolaupoko").to_string(),
                Some("s1"),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::CREATED);
        let json = json_body(response).await;
        assert_eq!(json["response"], "Kaneohe Bay's shoreline sees groundwater emerge first.");
        let actions = json["map_actions"].as_array().unwrap();
        assert_eq!(actions.len(), 2);
        assert_eq!(actions[0]["type"], "add_layer");
        assert_eq!(actions[1]["parameters"]["bounds"]["southwest"], json!([21.309, -157.9]));
    }

    #[tokio::test]
    async fn session_header_selects_history() {
        let state = test_state(&["First answer from the assistant.", "Second answer."]);
        let app = build_router(state.clone(), &[]);

        for query in ["Hello", "What about Waikiki?"] {
            let response = app
                .clone()
                .oneshot(post_chat(chat_body(query).to_string(), Some("s1")))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::CREATED);
        }

        let session = state
            .agent
            .context_store()
            .get(&SessionId::from("s1"))
            .await
            .unwrap()
            .unwrap();
        let contents: Vec<&str> = session.messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(
            contents,
            vec!["Hello", "First answer from the assistant.", "What about Waikiki?", "Second answer."]
        );
        assert!(
            state
                .agent
                .context_store()
                .get(&SessionId::from(chat::DEFAULT_SESSION))
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn missing_map_state_is_unprocessable() {
        let app = build_router(test_state(&[]), &[]);
        let response = app
            .oneshot(post_chat(json!({"query": "Hello"}).to_string(), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let json = json_body(response).await;
        assert!(json["detail"].as_str().unwrap().contains("map_state"));
    }

    #[tokio::test]
    async fn non_json_body_is_unprocessable() {
        let app = build_router(test_state(&[]), &[]);
        let response = app
            .oneshot(post_chat("query=Hello".into(), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn empty_query_is_unprocessable() {
        let app = build_router(test_state(&[]), &[]);
        let response = app
            .oneshot(post_chat(chat_body("   ").to_string(), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn upstream_failure_is_internal_error() {
        let app = build_router(test_state(&[]), &[]);
        let response = app
            .oneshot(post_chat(chat_body("Hello").to_string(), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let json = json_body(response).await;
        assert!(json["errors"].as_str().unwrap().contains("upstream unavailable"));
    }

    #[tokio::test]
    async fn response_validation_failure_is_bad_request() {
        use axum::response::IntoResponse;

        let response = ApiError::ResponseValidation(vec![FieldError {
            loc: vec![json!("map_actions"), json!(0), json!("type")],
            msg: "unknown action type 'teleport'".into(),
        }])
        .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = json_body(response).await;
        assert_eq!(json["error"], "AI response validation failed");
        assert_eq!(json["errors"][0]["loc"][1], 0);
    }

    #[tokio::test]
    async fn cors_allows_configured_origin() {
        let app = build_router(test_state(&[]), &["http://localhost:5173".to_string()]);
        let req = Request::builder()
            .uri("/health")
            .header("Origin", "http://localhost:5173")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(req).await.unwrap();
        assert_eq!(
            response.headers().get("access-control-allow-origin").unwrap(),
            "http://localhost:5173"
        );
    }
}
