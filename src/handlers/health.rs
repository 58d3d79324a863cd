use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;

use crate::flush::FlushStatsSnapshot;
use crate::state::ServerState;

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub batch_size: usize,
    pub buffered: Option<usize>,
    pub dead_letters: Option<usize>,
    pub live_subscribers: usize,
    pub watched_owners: usize,
    pub uptime_seconds: u64,
}

/// Health check endpoint; reports degraded if the buffer is unreachable
pub async fn health_check(
    State(state): State<Arc<ServerState>>,
) -> (StatusCode, Json<HealthResponse>) {
    let buffer = state.buffer();
    let buffered = buffer.len().await;
    let dead_letters = buffer.dead_letter_len().await;

    let healthy = buffered.is_ok() && dead_letters.is_ok();
    if let Err(e) = &buffered {
        warn!("Health check could not read buffer: {}", e);
    }

    let response = HealthResponse {
        status: if healthy { "healthy" } else { "degraded" }.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        batch_size: state.controller.batch_size(),
        buffered: buffered.ok(),
        dead_letters: dead_letters.ok(),
        live_subscribers: state.registry.subscriber_count(),
        watched_owners: state.registry.owner_count(),
        uptime_seconds: state.uptime_seconds(),
    };

    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(response))
}

/// Flush counters since startup
pub async fn flush_stats(State(state): State<Arc<ServerState>>) -> Json<FlushStatsSnapshot> {
    Json(state.controller.stats())
}
