//! API error mapping
//!
//! Client-facing bodies are short fixed strings; the underlying cause is
//! logged where the error is produced, never serialized into a response.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::db::StoreError;

/// Errors surfaced by the HTTP layer.
#[derive(Debug, PartialEq, Eq)]
pub enum ApiError {
    MissingId,
    InvalidId,
    NotFound,
    Internal,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::MissingId => (StatusCode::BAD_REQUEST, "Missing id parameter"),
            ApiError::InvalidId => (StatusCode::BAD_REQUEST, "Invalid id parameter"),
            ApiError::NotFound => (StatusCode::NOT_FOUND, "Order not found"),
            ApiError::Internal => (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error"),
        };
        (status, body).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => ApiError::NotFound,
            StoreError::InvalidId(_) => ApiError::InvalidId,
            StoreError::Database(_) => ApiError::Internal,
        }
    }
}
