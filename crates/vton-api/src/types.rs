//! Wire types for the API.

use axum::http::StatusCode;
use axum::response::Json;
use serde::{Deserialize, Serialize};

/// JSON error body: `{"error": <message>}`.
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiError {
    pub error: String,
}

impl ApiError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
        }
    }
}

pub type ErrorResponse = (StatusCode, Json<ApiError>);

pub fn bad_request(message: impl Into<String>) -> ErrorResponse {
    (StatusCode::BAD_REQUEST, Json(ApiError::new(message)))
}

pub fn server_error(message: impl Into<String>) -> ErrorResponse {
    (StatusCode::INTERNAL_SERVER_ERROR, Json(ApiError::new(message)))
}

/// Query parameters of the try-on endpoint.
#[derive(Debug, Deserialize)]
pub struct TryonParams {
    /// Client-chosen stem for the downloaded result.
    pub filename: Option<String>,
    /// Client-chosen stem recorded for the garment.
    pub filename2: Option<String>,
}
