use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;

use crate::routes::ApiState;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: HealthCheck,
    pub rate_limit_store: HealthCheck,
    pub checked_at: String,
}

pub fn router(state: ApiState) -> Router {
    Router::new().route("/health", get(health)).with_state(state)
}

pub async fn health(State(state): State<ApiState>) -> (StatusCode, Json<HealthResponse>) {
    let rate_limit_store = store_check(&state).await;
    let ready = rate_limit_store.status == "ready";

    let payload = HealthResponse {
        status: if ready { "ready" } else { "degraded" },
        service: HealthCheck {
            status: "ready",
            detail: "emissary-server runtime initialized".to_string(),
        },
        rate_limit_store,
        checked_at: Utc::now().to_rfc3339(),
    };

    let status_code = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status_code, Json(payload))
}

/// Read-only probe against the counter store. Uses a fixed identifier so the
/// probe never spends anyone's request budget.
async fn store_check(state: &ApiState) -> HealthCheck {
    match state.orchestrator().limiter().info("health-probe").await {
        Ok(_) => {
            HealthCheck { status: "ready", detail: "rate limit store responded".to_string() }
        }
        Err(error) => HealthCheck {
            status: "degraded",
            detail: format!("rate limit store check failed: {error}"),
        },
    }
}
