// Thin HTTP shell (§6): add-delayed-task ingress, stats, and health. All
// the actual validation and publish logic lives in `ingress`; this module
// is just axum wiring.

use crate::error::ApiError;
use crate::ingress;
use crate::state::AppState;
use axum::extract::{DefaultBodyLimit, State};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::Ordering;
use tower_http::trace::TraceLayer;

pub fn router(state: AppState) -> Router {
    let max_payload_bytes = state.max_payload_bytes;
    Router::new()
        .route("/api/v1/tasks/delay", post(post_delay))
        .route("/api/v1/stats", get(get_stats))
        .route("/health", get(get_health))
        .layer(DefaultBodyLimit::max(max_payload_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Debug, Deserialize)]
pub struct DelayRequest {
    pub delay_seconds: f64,
    pub callback_url: String,
    #[serde(default = "default_payload")]
    pub payload: serde_json::Value,
}

fn default_payload() -> serde_json::Value {
    serde_json::json!({})
}

#[derive(Debug, Serialize)]
pub struct DelayResponse {
    pub task_id: String,
    pub scheduled_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub pending: usize,
    pub dispatched_total: u64,
    pub succeeded_total: u64,
    pub failed_total: u64,
    pub retried_total: u64,
}

async fn post_delay(
    State(state): State<AppState>,
    Json(request): Json<DelayRequest>,
) -> Result<Json<DelayResponse>, ApiError> {
    if !state.accepting.load(Ordering::Relaxed) {
        return Err(ApiError::ShuttingDown);
    }

    let (task_id, scheduled_at) = ingress::submit_delayed_task(&state, request).await?;

    Ok(Json(DelayResponse {
        task_id: task_id.to_string(),
        scheduled_at,
    }))
}

async fn get_stats(State(state): State<AppState>) -> Json<StatsResponse> {
    let snapshot = state.metrics.snapshot();
    Json(StatsResponse {
        pending: state.wheel.size(),
        dispatched_total: snapshot.dispatched_total,
        succeeded_total: snapshot.succeeded_total,
        failed_total: snapshot.failed_total,
        retried_total: snapshot.retried_total,
    })
}

async fn get_health() -> impl IntoResponse {
    "OK"
}
