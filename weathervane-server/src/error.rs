//! HTTP error mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use weathervane_core::WeathervaneError;

/// Errors surfaced to HTTP clients as JSON bodies.
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    NoModelLoaded,
    Internal(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::NoModelLoaded => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn message(&self) -> String {
        match self {
            ApiError::BadRequest(msg) => msg.clone(),
            ApiError::NotFound(msg) => msg.clone(),
            ApiError::NoModelLoaded => "no model loaded".to_string(),
            ApiError::Internal(msg) => msg.clone(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(status = %status, error = self.message(), "request failed");
        }
        let body = serde_json::json!({ "error": self.message() });
        (status, Json(body)).into_response()
    }
}

impl From<WeathervaneError> for ApiError {
    fn from(err: WeathervaneError) -> Self {
        match err {
            WeathervaneError::NotFound(msg) => ApiError::NotFound(msg),
            WeathervaneError::InvalidInput(msg) => ApiError::BadRequest(msg),
            other => ApiError::Internal(other.to_string()),
        }
    }
}
