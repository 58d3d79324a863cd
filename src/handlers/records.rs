use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{error, info};

use crate::handlers::{api_error, ApiError};
use crate::state::ServerState;
use crate::storage::{RecordStore, StorageError};
use crate::telemetry::{PersistedRecord, Record, RecordId};

/// Largest page a list request may ask for
const MAX_PAGE_SIZE: i64 = 1000;

/// Pagination query parameters
#[derive(Debug, Deserialize)]
pub struct PaginationQuery {
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    100
}

fn local_store(state: &ServerState) -> Result<&Arc<dyn RecordStore>, ApiError> {
    state.record_store.as_ref().ok_or_else(|| {
        api_error(
            StatusCode::SERVICE_UNAVAILABLE,
            "Records are not stored by this instance",
            "NO_LOCAL_STORE",
        )
    })
}

fn storage_error(e: StorageError) -> ApiError {
    match e {
        StorageError::RecordNotFound(id) => api_error(
            StatusCode::NOT_FOUND,
            format!("Record {} not found", id),
            "RECORD_NOT_FOUND",
        ),
        other => {
            error!("Storage error: {}", other);
            api_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                other.to_string(),
                "STORAGE_ERROR",
            )
        }
    }
}

fn invalid_record(e: impl ToString) -> ApiError {
    api_error(StatusCode::UNPROCESSABLE_ENTITY, e.to_string(), "INVALID_RECORD")
}

/// Store a batch directly and broadcast it to subscribers
pub async fn create_records(
    State(state): State<Arc<ServerState>>,
    body: Bytes,
) -> Result<Json<Vec<PersistedRecord>>, ApiError> {
    let store = local_store(&state)?;

    let batch: Vec<Record> = serde_json::from_slice(&body).map_err(invalid_record)?;
    for record in &batch {
        record.validate().map_err(invalid_record)?;
    }

    let created = store.store(&batch).await.map_err(storage_error)?;
    let report = state.dispatcher().dispatch(&created);
    info!(
        "Stored {} records via API ({} deliveries)",
        created.len(),
        report.deliveries
    );

    Ok(Json(created))
}

/// List stored records
pub async fn list_records(
    State(state): State<Arc<ServerState>>,
    Query(query): Query<PaginationQuery>,
) -> Result<Json<Vec<PersistedRecord>>, ApiError> {
    let store = local_store(&state)?;
    let limit = query.limit.clamp(0, MAX_PAGE_SIZE);
    let offset = query.offset.max(0);

    let records = store.list(limit, offset).await.map_err(storage_error)?;
    Ok(Json(records))
}

/// Get a stored record by id
pub async fn get_record(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<RecordId>,
) -> Result<Json<PersistedRecord>, ApiError> {
    let store = local_store(&state)?;
    let record = store.get(id).await.map_err(storage_error)?;
    Ok(Json(record))
}

/// Replace a stored record
pub async fn update_record(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<RecordId>,
    body: Bytes,
) -> Result<Json<PersistedRecord>, ApiError> {
    let store = local_store(&state)?;
    let record = Record::parse(&body).map_err(invalid_record)?;

    let updated = store.update(id, &record).await.map_err(storage_error)?;
    Ok(Json(updated))
}

/// Delete a stored record, returning it
pub async fn delete_record(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<RecordId>,
) -> Result<Json<PersistedRecord>, ApiError> {
    let store = local_store(&state)?;
    let deleted = store.delete(id).await.map_err(storage_error)?;
    Ok(Json(deleted))
}
