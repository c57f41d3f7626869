//! HTTP Error Mapping

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use mileage::MileageError;
use serde::Serialize;
use thiserror::Error;
use tracing::error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error(transparent)]
    Mileage(#[from] MileageError),

    #[error("{0}")]
    BadRequest(String),
}

/// Error body: `{ "error": code, "message": text }`
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
    pub message: String,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Mileage(e) if e.is_validation() => StatusCode::BAD_REQUEST,
            ApiError::Mileage(e) if e.is_not_found() => StatusCode::NOT_FOUND,
            ApiError::Mileage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "bad_request",
            ApiError::Mileage(MileageError::Validation(_)) => "invalid_input",
            ApiError::Mileage(MileageError::ShiftNotFound(_)) => "not_found",
            ApiError::Mileage(MileageError::Storage(_)) => "storage_error",
            ApiError::Mileage(MileageError::Task(_)) => "internal_error",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("Request failed: {}", self);
        }

        let body = ErrorBody {
            error: self.code(),
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}
