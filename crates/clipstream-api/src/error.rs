//! HTTP error conversion for adapter failures.
//!
//! `NotFound` becomes 404; any remaining adapter error becomes 500 with a
//! short literal message. The streaming handlers reply in plain text, the
//! metadata endpoint builds its JSON payloads itself.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use clipstream_db::CatalogError;
use clipstream_storage::StorageError;

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: &'static str,
}

impl ApiError {
    pub fn not_found(message: &'static str) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message,
        }
    }

    pub fn internal(message: &'static str) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message,
        }
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(_) => Self::not_found("Not found"),
            other => {
                tracing::error!(error = %other, "storage error");
                Self::internal("Storage error")
            }
        }
    }
}

impl From<CatalogError> for ApiError {
    fn from(err: CatalogError) -> Self {
        match err {
            CatalogError::NotFound(_) => Self::not_found("Not found"),
            other => {
                tracing::error!(error = %other, "catalog error");
                Self::internal("Catalog error")
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, self.message).into_response()
    }
}
