use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use emissary_agent::ConversationSession;
use emissary_core::ChatMessage;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{error, info};

use crate::bootstrap::Orchestrator;

const SESSION_IDLE_TIMEOUT: Duration = Duration::from_secs(60 * 60);

struct SessionEntry {
    last_seen: Instant,
    session: Arc<Mutex<ConversationSession>>,
}

type SessionRegistry = Mutex<HashMap<String, SessionEntry>>;

#[derive(Clone)]
pub struct ApiState {
    orchestrator: Arc<Orchestrator>,
    sessions: Arc<SessionRegistry>,
    api_key: Option<SecretString>,
}

impl ApiState {
    pub fn new(orchestrator: Arc<Orchestrator>, api_key: Option<SecretString>) -> Self {
        Self { orchestrator, sessions: Arc::new(Mutex::new(HashMap::new())), api_key }
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/api/chat", post(chat))
        .route("/api/rate-limit/info", get(rate_limit_info))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub messages: Vec<ChatMessage>,
    pub show_meeting_form: bool,
}

#[derive(Debug, Serialize)]
pub struct RateLimitInfoResponse {
    pub total: u32,
    pub remaining: u32,
    pub reset: i64,
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: String,
}

type ApiResult<T> = Result<(StatusCode, Json<T>), (StatusCode, Json<ApiError>)>;

/// Runs one conversation turn for the caller's identifier. Turns for the
/// same identifier are serialized on the session lock; different identifiers
/// proceed in parallel.
async fn chat(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Json(request): Json<ChatRequest>,
) -> ApiResult<ChatResponse> {
    authorize(&state, &headers)?;

    let identifier = client_identifier(&headers);
    let session = session_for(&state, &identifier).await;
    let mut session = session.lock().await;

    match state.orchestrator.process_turn(&mut session, &request.message).await {
        Ok(outcome) => {
            let status = if outcome.rate_limited {
                StatusCode::TOO_MANY_REQUESTS
            } else {
                StatusCode::OK
            };
            info!(
                event_name = "api.chat.turn_completed",
                identifier = %identifier,
                appended = outcome.messages.len(),
                rate_limited = outcome.rate_limited,
                "chat turn processed"
            );
            Ok((
                status,
                Json(ChatResponse {
                    messages: outcome.messages,
                    show_meeting_form: outcome.show_meeting_form,
                }),
            ))
        }
        Err(turn_error) => {
            error!(
                event_name = "api.chat.turn_aborted",
                identifier = %identifier,
                error = %turn_error,
                "chat turn aborted"
            );
            Err((StatusCode::BAD_GATEWAY, Json(ApiError { error: turn_error.to_string() })))
        }
    }
}

/// Non-mutating view of the caller's rate-limit window; does not count as a
/// request.
async fn rate_limit_info(
    State(state): State<ApiState>,
    headers: HeaderMap,
) -> ApiResult<RateLimitInfoResponse> {
    authorize(&state, &headers)?;

    let identifier = client_identifier(&headers);
    match state.orchestrator.limiter().info(&identifier).await {
        Ok(info) => Ok((
            StatusCode::OK,
            Json(RateLimitInfoResponse {
                total: info.total,
                remaining: info.remaining,
                reset: info.reset_secs,
            }),
        )),
        Err(limit_error) => {
            error!(
                event_name = "api.rate_limit.info_failed",
                identifier = %identifier,
                error = %limit_error,
                "rate limit info lookup failed"
            );
            Err((StatusCode::BAD_GATEWAY, Json(ApiError { error: limit_error.to_string() })))
        }
    }
}

fn authorize(state: &ApiState, headers: &HeaderMap) -> Result<(), (StatusCode, Json<ApiError>)> {
    let Some(expected) = &state.api_key else {
        return Ok(());
    };

    let provided = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "));

    if provided == Some(expected.expose_secret()) {
        Ok(())
    } else {
        Err((
            StatusCode::UNAUTHORIZED,
            Json(ApiError { error: "invalid or missing api key".to_string() }),
        ))
    }
}

/// First address in `x-forwarded-for`, or `unknown` when the header is
/// absent or unreadable. The identifier keys both sessions and rate limits.
fn client_identifier(headers: &HeaderMap) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or("unknown")
        .to_string()
}

async fn session_for(state: &ApiState, identifier: &str) -> Arc<Mutex<ConversationSession>> {
    let mut sessions = state.sessions.lock().await;
    let now = Instant::now();
    prune_idle(&mut sessions, now, SESSION_IDLE_TIMEOUT);

    let entry = sessions.entry(identifier.to_string()).or_insert_with(|| SessionEntry {
        last_seen: now,
        session: Arc::new(Mutex::new(ConversationSession::new(identifier))),
    });
    entry.last_seen = now;
    entry.session.clone()
}

/// The forwarded-for identifier is caller-controlled, so without eviction the
/// registry grows one entry per forged address. Sessions idle past the
/// timeout are dropped before every lookup.
fn prune_idle(
    sessions: &mut HashMap<String, SessionEntry>,
    now: Instant,
    idle_timeout: Duration,
) {
    sessions.retain(|_, entry| now.duration_since(entry.last_seen) < idle_timeout);
}
