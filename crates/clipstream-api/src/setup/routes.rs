//! Route configuration and middleware layering.

use std::time::Duration;

use axum::http::{header, Method};
use axum::routing::get;
use axum::Router;
use tower_http::compression::predicate::Predicate;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::state::AppState;

/// Whole-request timeout for the non-streaming routes. Streaming routes are
/// exempt: a fixed response deadline would sever large video downloads.
const CONTROL_TIMEOUT: Duration = Duration::from_secs(30);

/// Compress only HLS manifests; everything else this node serves is already
/// compressed media.
#[derive(Clone, Copy, Debug, Default)]
struct ManifestOnly;

impl Predicate for ManifestOnly {
    fn should_compress<B>(&self, response: &http::Response<B>) -> bool
    where
        B: http_body::Body,
    {
        response
            .headers()
            .get(http::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|ct| ct.starts_with("application/vnd.apple.mpegurl"))
    }
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    let streaming = Router::new()
        .route("/video/:video", get(handlers::video::stream_video))
        .layer(CompressionLayer::new().compress_when(ManifestOnly));

    let control = Router::new()
        .route("/ping", get(handlers::ping::ping))
        .route("/ping-test.json", get(handlers::ping::ping_test_file))
        .route("/api/videos/:video", get(handlers::video::video_metadata))
        .route(
            "/video/thumbnail/:thumbnail",
            get(handlers::thumbnail::get_thumbnail),
        )
        .route(
            "/profile-pictures/:username",
            get(handlers::profile::get_profile_image),
        )
        .route("/badges/:id", get(handlers::badge::get_badge))
        .layer(TimeoutLayer::new(CONTROL_TIMEOUT));

    Router::new()
        .merge(streaming)
        .merge(control)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
