//! Badge images served from the local filesystem.

use std::path::PathBuf;

use axum::body::Body;
use axum::extract::Path;
use axum::http::{header, StatusCode};
use axum::response::Response;
use tokio_util::io::ReaderStream;

use crate::error::ApiError;

const BADGE_DIR: &str = "static/badges";
const EXTENSIONS: [&str; 3] = [".jpg", ".png", ".jpeg"];

pub async fn get_badge(Path(id): Path<String>) -> Result<Response, ApiError> {
    let id = id.replace(['/', '\\'], "").replace("..", "");

    for ext in EXTENSIONS {
        let path = PathBuf::from(BADGE_DIR).join(format!("{id}{ext}"));
        let Ok(file) = tokio::fs::File::open(&path).await else {
            continue;
        };

        let content_type = if ext == ".png" {
            "image/png"
        } else {
            "image/jpeg"
        };
        return Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, content_type)
            .body(Body::from_stream(ReaderStream::new(file)))
            .map_err(|_| ApiError::internal("Failed to build response"));
    }

    Err(ApiError::not_found("Badge not found"))
}
