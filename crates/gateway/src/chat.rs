//! `POST /chat`: one conversational turn.
//!
//! Request body `{query, map_state}`, optional `X-Session-Id` header.
//! Success is `201` with `{response, map_actions}`. A malformed body is
//! `422`, a response that fails the wire schema is `400` with structured
//! errors, anything else is `500`.

use axum::{
    extract::{FromRequest, State, rejection::JsonRejection},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tidemark_core::error::Error;
use tidemark_core::map::{AgentResponse, MapActionKind, MapState};
use tidemark_core::message::SessionId;
use tracing::{error, info, warn};

use crate::SharedState;

/// Header carrying the client's session id.
pub const SESSION_HEADER: &str = "x-session-id";

/// Session used when the header is absent.
pub const DEFAULT_SESSION: &str = "default";

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub query: String,
    pub map_state: MapState,
}

/// One map action as it goes over the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionShape {
    #[serde(rename = "type")]
    pub kind: MapActionKind,
    pub parameters: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatResponse {
    pub response: String,
    pub map_actions: Option<Vec<ActionShape>>,
}

/// Where a response failed the wire schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldError {
    pub loc: Vec<Value>,
    pub msg: String,
}

impl TryFrom<AgentResponse> for ChatResponse {
    type Error = Vec<FieldError>;

    fn try_from(agent: AgentResponse) -> Result<Self, Self::Error> {
        let mut errors = Vec::new();

        if agent.response.trim().is_empty() {
            errors.push(FieldError {
                loc: vec![json!("response")],
                msg: "response must not be empty".into(),
            });
        }

        let mut actions = Vec::new();
        for (i, action) in agent.map_actions.unwrap_or_default().into_iter().enumerate() {
            match action.kind() {
                Some(kind) => actions.push(ActionShape {
                    kind,
                    parameters: action.parameters,
                }),
                None => errors.push(FieldError {
                    loc: vec![json!("map_actions"), json!(i), json!("type")],
                    msg: format!("unknown action type '{}'", action.action_type),
                }),
            }
        }

        if !errors.is_empty() {
            return Err(errors);
        }

        Ok(Self {
            response: agent.response,
            map_actions: if actions.is_empty() {
                None
            } else {
                Some(actions)
            },
        })
    }
}

/// Everything `/chat` can fail with.
#[derive(Debug)]
pub enum ApiError {
    /// The request body could not be used.
    Unprocessable(String),
    /// The assistant's answer does not fit the wire schema.
    ResponseValidation(Vec<FieldError>),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Unprocessable(detail) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(json!({ "detail": detail })),
            )
                .into_response(),
            ApiError::ResponseValidation(errors) => (
                StatusCode::BAD_REQUEST,
                Json(json!({
                    "error": "AI response validation failed",
                    "errors": errors,
                })),
            )
                .into_response(),
            ApiError::Internal(message) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "errors": message })),
            )
                .into_response(),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::Unprocessable(rejection.body_text())
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        match err {
            Error::InvalidInput(detail) => ApiError::Unprocessable(detail),
            other => {
                error!(error = %other, "Chat request failed");
                ApiError::Internal(other.to_string())
            }
        }
    }
}

/// `Json` whose rejections become [`ApiError::Unprocessable`].
#[derive(FromRequest)]
#[from_request(via(Json), rejection(ApiError))]
pub struct ApiJson<T>(pub T);

pub async fn chat_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
    ApiJson(request): ApiJson<ChatRequest>,
) -> Result<(StatusCode, Json<ChatResponse>), ApiError> {
    let session_id = headers
        .get(SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(SessionId::from)
        .unwrap_or_else(|| SessionId::from(DEFAULT_SESSION));

    info!(session = %session_id, query_len = request.query.len(), "Chat request");

    let answer = state
        .agent
        .process_query(&request.query, &request.map_state, &session_id)
        .await?;

    let response = ChatResponse::try_from(answer).map_err(|errors| {
        warn!(count = errors.len(), "Assistant response failed wire validation");
        ApiError::ResponseValidation(errors)
    })?;

    Ok((StatusCode::CREATED, Json(response)))
}
