use axum::{body::Bytes, extract::State, http::StatusCode, Json};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error, warn};

use crate::handlers::{api_error, ApiError};
use crate::state::ServerState;
use crate::telemetry::Record;

/// Acknowledgement returned once a record is buffered
#[derive(Debug, Serialize)]
pub struct IngestResponse {
    pub status: String,
    /// Buffer length right after this insert
    pub buffered: usize,
}

/// Request-endpoint ingress: buffer one record and return without waiting
/// for the flush.
pub async fn ingest_record(
    State(state): State<Arc<ServerState>>,
    body: Bytes,
) -> Result<Json<IngestResponse>, ApiError> {
    let record = Record::parse(&body).map_err(|e| {
        warn!("Rejected record from request: {}", e);
        api_error(StatusCode::UNPROCESSABLE_ENTITY, e.to_string(), "INVALID_RECORD")
    })?;

    let entry = record.to_entry().map_err(|e| {
        api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string(), "SERIALIZATION_ERROR")
    })?;

    let len = state.controller.insert(entry).await.map_err(|e| {
        error!("Failed to buffer record: {}", e);
        api_error(StatusCode::SERVICE_UNAVAILABLE, e.to_string(), "BUFFER_UNAVAILABLE")
    })?;
    debug!("Buffered record for owner {} (len {})", record.owner(), len);

    state.controller.spawn_flush(len);

    Ok(Json(IngestResponse {
        status: "ok".to_string(),
        buffered: len,
    }))
}
