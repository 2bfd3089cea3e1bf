//! Poster thumbnail delivery.

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::Response;

use clipstream_storage::StorageError;

use crate::error::ApiError;
use crate::state::AppState;

pub async fn get_thumbnail(
    State(state): State<AppState>,
    Path(thumbnail): Path<String>,
) -> Result<Response, ApiError> {
    let info = state
        .store
        .stat(&state.buckets.thumbnails, &thumbnail)
        .await
        .map_err(|e| match e {
            StorageError::NotFound(_) => ApiError::not_found("Thumbnail not found"),
            other => {
                tracing::error!(error = %other, key = %thumbnail, "failed to stat thumbnail");
                ApiError::internal("Failed to retrieve thumbnail")
            }
        })?;

    let stream = state
        .store
        .get_range(&state.buckets.thumbnails, &thumbnail, 0, info.size - 1)
        .await
        .map_err(|_| ApiError::internal("Failed to retrieve thumbnail"))?;

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "image/jpeg")
        .header(header::CONTENT_LENGTH, info.size)
        .body(Body::from_stream(stream))
        .map_err(|_| ApiError::internal("Failed to build response"))
}
