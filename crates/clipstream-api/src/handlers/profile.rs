//! Profile image delivery with filename-pattern fallback.
//!
//! The profile bucket is provisioned externally; this node only reads it.

use std::collections::HashMap;

use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::Response;

use crate::error::ApiError;
use crate::handlers::video::expires_for;
use crate::state::AppState;

/// Key prefix inside the profile bucket.
const PROFILE_PREFIX: &str = "profile-pictures";
const DEFAULT_IMAGE: &str = "default.jpg";

fn candidate_patterns(username: &str) -> [String; 6] {
    [
        format!("{username}.jpg"),
        format!("{username}.png"),
        format!("{username}.jpeg"),
        format!("user_{username}.jpg"),
        format!("user_{username}.png"),
        format!("user_{username}.jpeg"),
    ]
}

pub async fn get_profile_image(
    State(state): State<AppState>,
    Path(username): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Response, ApiError> {
    let Some(bucket) = state.buckets.profiles.clone() else {
        return Err(ApiError::not_found("Profile image not found"));
    };

    let username = username.replace(['/', '\\'], "");

    let mut image_file = None;
    for pattern in candidate_patterns(&username) {
        let key = format!("{PROFILE_PREFIX}/{pattern}");
        if state.store.stat(&bucket, &key).await.is_ok() {
            image_file = Some((key, pattern));
            break;
        }
    }

    let (key, filename) = match image_file {
        Some(found) => found,
        None => {
            let key = format!("{PROFILE_PREFIX}/{DEFAULT_IMAGE}");
            if state.store.stat(&bucket, &key).await.is_err() {
                tracing::error!(username = %username, "default profile image missing");
                return Err(ApiError::internal("Default profile image not found"));
            }
            (key, DEFAULT_IMAGE.to_string())
        }
    };

    let stream = state
        .store
        .get_range(&bucket, &key, 0, -1)
        .await
        .map_err(|_| ApiError::internal("Failed to retrieve profile image"))?;

    let content_type = if filename.ends_with(".png") {
        "image/png"
    } else {
        "image/jpeg"
    };
    let no_cache = params.get("nocache").is_some_and(|v| !v.is_empty());
    let cache_control = if no_cache {
        "no-store, no-cache, must-revalidate, max-age=0"
    } else {
        "public, max-age=86400"
    };

    let mut builder = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type)
        .header(header::CACHE_CONTROL, cache_control);
    if !no_cache {
        if let Some(expires) = expires_for(cache_control) {
            builder = builder.header(header::EXPIRES, expires);
        }
    }

    builder
        .body(Body::from_stream(stream))
        .map_err(|_| ApiError::internal("Failed to build response"))
}
