//! # API Errors
//!
//! Maps engine errors onto HTTP responses with a stable JSON error body.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::error::EngineError;
use crate::observability::Logger;

/// Result type for handlers
pub type ApiResult<T> = Result<T, ApiError>;

/// An engine error carried to the HTTP boundary
#[derive(Debug)]
pub struct ApiError(pub EngineError);

/// JSON error body
#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    code: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    field: Option<String>,
}

impl ApiError {
    fn status_code(&self) -> StatusCode {
        match &self.0 {
            EngineError::Validation { .. } | EngineError::Query(_) => StatusCode::BAD_REQUEST,
            EngineError::NotFound(_) => StatusCode::NOT_FOUND,
            EngineError::Conflict(_) => StatusCode::CONFLICT,
            EngineError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            Logger::error("REQUEST_FAILED", &[("error", &self.0.to_string())]);
        }
        let body = ErrorBody {
            error: self.0.to_string(),
            code: self.0.code(),
            field: self.0.field().map(str::to_string),
        };
        (status, Json(body)).into_response()
    }
}
