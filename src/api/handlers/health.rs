/*
 * Responsibility
 * - GET /health (liveness, public)
 * - reports the backend breaker state so operators can see an open circuit
 */
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde_json::json;

use crate::services::breaker::BreakerState;
use crate::state::AppState;

pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let breaker = match state.breaker.state() {
        BreakerState::Closed => "closed",
        BreakerState::Open => "open",
        BreakerState::HalfOpen => "half_open",
    };

    (
        StatusCode::OK,
        Json(json!({
            "status": "ok",
            "breaker": { "name": state.breaker.name(), "state": breaker },
        })),
    )
}
