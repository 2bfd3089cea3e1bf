//! Lifecycle metadata and range-streaming delivery for processed videos.

use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};

use clipstream_core::VideoStatus;

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Serialize)]
struct StatusResponse {
    status: &'static str,
    message: &'static str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct VideoInfo {
    size: i64,
    content_type: String,
    file_path: String,
    cdn_url: String,
}

#[derive(Serialize)]
struct CompletedResponse {
    status: &'static str,
    message: &'static str,
    data: VideoInfo,
}

/// Maps catalog state and delivery-object presence to a stable status
/// payload for clients polling upload progress.
pub async fn video_metadata(
    State(state): State<AppState>,
    Path(video): Path<String>,
) -> Response {
    let status = match state.catalog.get_status(&video).await {
        Ok(status) => status,
        Err(e) => {
            tracing::error!(error = %e, key = %video, "failed to check video status");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(StatusResponse {
                    status: "error",
                    message: "Error checking video status",
                }),
            )
                .into_response();
        }
    };

    match status {
        VideoStatus::Pending => (
            StatusCode::ACCEPTED,
            Json(StatusResponse {
                status: "pending",
                message: "Video is pending processing",
            }),
        )
            .into_response(),
        VideoStatus::Processing => (
            StatusCode::ACCEPTED,
            Json(StatusResponse {
                status: "processing",
                message: "Video is currently being processed",
            }),
        )
            .into_response(),
        VideoStatus::Failed => (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(StatusResponse {
                status: "failed",
                message: "Video processing failed",
            }),
        )
            .into_response(),
        VideoStatus::Unknown => not_found_response(),
        VideoStatus::Completed => {
            match state.store.stat(&state.buckets.videos, &video).await {
                Ok(info) => {
                    let content_type = info
                        .content_type
                        .filter(|ct| !ct.is_empty())
                        .unwrap_or_else(|| content_type_for(&video).to_string());
                    (
                        StatusCode::OK,
                        Json(CompletedResponse {
                            status: "completed",
                            message: "Video is ready",
                            data: VideoInfo {
                                size: info.size,
                                content_type,
                                file_path: video.clone(),
                                cdn_url: format!("/video/{video}"),
                            },
                        }),
                    )
                        .into_response()
                }
                Err(e) => {
                    tracing::warn!(error = %e, key = %video, "completed video missing from delivery bucket");
                    not_found_response()
                }
            }
        }
    }
}

fn not_found_response() -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(StatusResponse {
            status: "not_found",
            message: "Video not found",
        }),
    )
        .into_response()
}

#[derive(Deserialize)]
pub struct StreamParams {
    cache: Option<String>,
    nocache: Option<String>,
}

/// RFC 7233 range delivery from the videos bucket, with HLS passthrough for
/// manifests and segments.
pub async fn stream_video(
    State(state): State<AppState>,
    Path(video): Path<String>,
    Query(params): Query<StreamParams>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let info = state
        .store
        .stat(&state.buckets.videos, &video)
        .await
        .map_err(|e| match e {
            clipstream_storage::StorageError::NotFound(_) => ApiError::not_found("Video not found"),
            other => {
                tracing::error!(error = %other, key = %video, "failed to stat video");
                ApiError::internal("Error reading video")
            }
        })?;

    let content_type = info
        .content_type
        .filter(|ct| !ct.is_empty())
        .unwrap_or_else(|| content_type_for(&video).to_string());
    let cache_control = cache_control_for(
        &video,
        params.cache.as_deref() == Some("true"),
        params.nocache.as_deref().is_some_and(|v| !v.is_empty()),
    );

    // HLS passthrough: manifests may be gzip-compressed by the response
    // layer; segments go out chunked with no declared length.
    if video.ends_with(".m3u8") || video.ends_with(".ts") {
        let stream = state
            .store
            .get_range(&state.buckets.videos, &video, 0, -1)
            .await
            .map_err(|_| ApiError::internal("Error reading HLS content"))?;

        let mut builder = Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, content_type)
            .header(header::CACHE_CONTROL, cache_control)
            .header(header::ACCEPT_RANGES, "bytes");
        if let Some(expires) = expires_for(cache_control) {
            builder = builder.header(header::EXPIRES, expires);
        }
        return builder
            .body(Body::from_stream(stream))
            .map_err(|_| ApiError::internal("Failed to build response"));
    }

    let size = info.size;
    let (start, end) = parse_range(
        headers.get(header::RANGE).and_then(|v| v.to_str().ok()),
        size,
    );

    if start >= size {
        return Response::builder()
            .status(StatusCode::RANGE_NOT_SATISFIABLE)
            .header(header::CONTENT_RANGE, format!("bytes */{size}"))
            .body(Body::from("Requested range not satisfiable"))
            .map_err(|_| ApiError::internal("Failed to build response"));
    }

    let stream = state
        .store
        .get_range(&state.buckets.videos, &video, start, end)
        .await
        .map_err(|_| ApiError::internal("Error reading video"))?;

    let content_length = end - start + 1;
    let partial = start > 0 || end < size - 1;

    let mut builder = Response::builder()
        .header(header::CONTENT_TYPE, content_type)
        .header(header::CACHE_CONTROL, cache_control)
        .header(header::ACCEPT_RANGES, "bytes")
        .header(header::CONTENT_LENGTH, content_length);
    if let Some(expires) = expires_for(cache_control) {
        builder = builder.header(header::EXPIRES, expires);
    }
    if partial {
        builder = builder
            .status(StatusCode::PARTIAL_CONTENT)
            .header(header::CONTENT_RANGE, format!("bytes {start}-{end}/{size}"));
    } else {
        builder = builder.status(StatusCode::OK);
    }

    builder
        .body(Body::from_stream(stream))
        .map_err(|_| ApiError::internal("Failed to build response"))
}

/// Parses a `Range` header into a clamped inclusive window. Absent or
/// malformed headers fall back to the full object; an out-of-bounds start is
/// left for the caller to reject with 416.
fn parse_range(header: Option<&str>, size: i64) -> (i64, i64) {
    let full = (0, size - 1);
    let Some(value) = header else { return full };
    let Some(window) = value.strip_prefix("bytes=") else { return full };
    let Some((start_s, end_s)) = window.split_once('-') else { return full };
    let Ok(start) = start_s.trim().parse::<i64>() else { return full };
    let start = start.max(0);
    let end = match end_s.trim() {
        "" => size - 1,
        e => match e.parse::<i64>() {
            Ok(v) => v.min(size - 1),
            Err(_) => size - 1,
        },
    };
    (start, end)
}

fn content_type_for(name: &str) -> &'static str {
    let ext = name.rsplit_once('.').map(|(_, ext)| ext).unwrap_or("");
    match ext.to_ascii_lowercase().as_str() {
        "mp4" => "video/mp4",
        "m3u8" => "application/vnd.apple.mpegurl",
        "ts" => "video/MP2T",
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        _ => "application/octet-stream",
    }
}

fn cache_control_for(name: &str, force_cache: bool, no_cache: bool) -> &'static str {
    if force_cache {
        "public, max-age=604800, immutable"
    } else if no_cache {
        "no-store, no-cache, must-revalidate, max-age=0"
    } else if name.ends_with(".m3u8") {
        // Manifests need frequent refreshing.
        "public, max-age=10, must-revalidate"
    } else if name.ends_with(".ts") {
        // Segments are immutable.
        "public, max-age=604800, immutable"
    } else {
        "public, max-age=31536000, immutable"
    }
}

/// HTTP-date `Expires` companion for cacheable responses.
pub(crate) fn expires_for(cache_control: &str) -> Option<String> {
    if cache_control.contains("no-cache") {
        return None;
    }
    let ttl = if cache_control.contains("max-age=604800") {
        ChronoDuration::days(7)
    } else if cache_control.contains("max-age=31536000") {
        ChronoDuration::days(365)
    } else {
        ChronoDuration::days(1)
    };
    Some((Utc::now() + ttl).format("%a, %d %b %Y %H:%M:%S GMT").to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_range_covers_the_whole_object() {
        assert_eq!(parse_range(None, 1000), (0, 999));
    }

    #[test]
    fn bounded_range_is_clamped_to_the_object() {
        assert_eq!(parse_range(Some("bytes=0-499"), 1000), (0, 499));
        assert_eq!(parse_range(Some("bytes=500-2000"), 1000), (500, 999));
        assert_eq!(parse_range(Some("bytes=0-0"), 1000), (0, 0));
    }

    #[test]
    fn open_ended_range_runs_to_the_last_byte() {
        assert_eq!(parse_range(Some("bytes=200-"), 1000), (200, 999));
    }

    #[test]
    fn malformed_ranges_fall_back_to_the_full_object() {
        assert_eq!(parse_range(Some("bytes=abc-def"), 1000), (0, 999));
        assert_eq!(parse_range(Some("chunks=0-10"), 1000), (0, 999));
        assert_eq!(parse_range(Some("bytes=-500"), 1000), (0, 999));
    }

    #[test]
    fn out_of_bounds_start_is_preserved_for_416() {
        let (start, _) = parse_range(Some("bytes=1000-"), 1000);
        assert!(start >= 1000);
    }

    #[test]
    fn content_types_cover_the_delivery_formats() {
        assert_eq!(content_type_for("a.mp4"), "video/mp4");
        assert_eq!(content_type_for("a.m3u8"), "application/vnd.apple.mpegurl");
        assert_eq!(content_type_for("a.ts"), "video/MP2T");
        assert_eq!(content_type_for("a.bin"), "application/octet-stream");
    }

    #[test]
    fn cache_tiers_match_content_kind() {
        assert_eq!(
            cache_control_for("a.m3u8", false, false),
            "public, max-age=10, must-revalidate"
        );
        assert_eq!(
            cache_control_for("a.ts", false, false),
            "public, max-age=604800, immutable"
        );
        assert_eq!(
            cache_control_for("a.mp4", false, false),
            "public, max-age=31536000, immutable"
        );
        assert_eq!(
            cache_control_for("a.mp4", true, false),
            "public, max-age=604800, immutable"
        );
        assert_eq!(
            cache_control_for("a.mp4", false, true),
            "no-store, no-cache, must-revalidate, max-age=0"
        );
    }

    #[test]
    fn no_cache_responses_carry_no_expires() {
        assert!(expires_for("no-store, no-cache, must-revalidate, max-age=0").is_none());
        assert!(expires_for("public, max-age=31536000, immutable").is_some());
    }
}
