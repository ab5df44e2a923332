//! Turn API. Each session id names one independent conversation.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use bankbot_agent::{AgentRuntime, SessionSnapshot, TurnResponse, UserTurn};
use serde::{Deserialize, Serialize};
use tracing::info;

pub const MAX_MESSAGE_CHARS: usize = 1_000;
const MAX_SESSION_ID_CHARS: usize = 128;

#[derive(Clone)]
pub struct ApiState {
    runtime: Arc<AgentRuntime>,
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: String,
}

#[derive(Debug, Deserialize)]
pub struct MessageRequest {
    pub text: String,
    #[serde(default)]
    pub current_user: Option<String>,
    #[serde(default)]
    pub from_control: bool,
}

type ApiResult<T> = Result<T, (StatusCode, Json<ApiError>)>;

pub fn router(runtime: Arc<AgentRuntime>) -> Router {
    Router::new()
        .route("/api/sessions/{session_id}/messages", post(post_message))
        .route("/api/sessions/{session_id}", get(get_session).delete(end_session))
        .with_state(ApiState { runtime })
}

async fn post_message(
    Path(session_id): Path<String>,
    State(state): State<ApiState>,
    Json(request): Json<MessageRequest>,
) -> ApiResult<Json<TurnResponse>> {
    validate_session_id(&session_id)?;
    if request.text.chars().count() > MAX_MESSAGE_CHARS {
        return Err(bad_request(format!("text must be at most {MAX_MESSAGE_CHARS} characters")));
    }

    let turn = UserTurn {
        text: request.text,
        current_user: request.current_user.filter(|user| !user.trim().is_empty()),
        from_control: request.from_control,
    };
    Ok(Json(state.runtime.handle_message(&session_id, turn).await))
}

async fn get_session(
    Path(session_id): Path<String>,
    State(state): State<ApiState>,
) -> ApiResult<Json<SessionSnapshot>> {
    validate_session_id(&session_id)?;
    state.runtime.snapshot(&session_id).await.map(Json).ok_or_else(|| session_not_found(&session_id))
}

async fn end_session(
    Path(session_id): Path<String>,
    State(state): State<ApiState>,
) -> ApiResult<StatusCode> {
    validate_session_id(&session_id)?;
    if state.runtime.end_session(&session_id).await {
        info!(event_name = "api.session.deleted", session_id = %session_id, "session deleted");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(session_not_found(&session_id))
    }
}

fn validate_session_id(session_id: &str) -> ApiResult<()> {
    let valid = !session_id.is_empty()
        && session_id.len() <= MAX_SESSION_ID_CHARS
        && session_id.chars().all(|ch| ch.is_ascii_alphanumeric() || ch == '-' || ch == '_');
    if valid {
        Ok(())
    } else {
        Err(bad_request("session id must be 1-128 characters of [A-Za-z0-9_-]".to_string()))
    }
}

fn bad_request(error: String) -> (StatusCode, Json<ApiError>) {
    (StatusCode::BAD_REQUEST, Json(ApiError { error }))
}

fn session_not_found(session_id: &str) -> (StatusCode, Json<ApiError>) {
    (StatusCode::NOT_FOUND, Json(ApiError { error: format!("session `{session_id}` not found") }))
}
