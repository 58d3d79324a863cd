mod health;
mod records;

pub use health::*;
pub use records::*;

use axum::{http::StatusCode, Json};
use serde::Serialize;

/// Error body shared by all JSON endpoints
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

pub type ApiError = (StatusCode, Json<ErrorResponse>);

pub(crate) fn api_error(status: StatusCode, error: impl Into<String>, code: &str) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: error.into(),
            code: code.to_string(),
        }),
    )
}
