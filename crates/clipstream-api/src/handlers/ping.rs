//! Liveness and latency probes for client connection-quality measurement.

use std::collections::HashMap;
use std::time::Instant;

use axum::extract::Query;
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use serde::Serialize;

/// Upper bound on the test-delay parameter.
const MAX_DELAY_MS: u64 = 5000;

#[derive(Serialize)]
struct PingResponse {
    status: &'static str,
    /// Milliseconds since the epoch.
    time: i64,
    #[serde(rename = "serverTime")]
    server_time: i64,
}

#[derive(Serialize)]
struct PingTestResponse {
    status: &'static str,
    timestamp: i64,
    #[serde(rename = "processingTime")]
    processing_time: i64,
}

/// `GET /ping`. An optional `delay=<ms>` parameter (clamped to 5 s)
/// simulates slow connections for client-side probes.
pub async fn ping(Query(params): Query<HashMap<String, String>>) -> Response {
    let start = Instant::now();

    if let Some(delay) = params.get("delay").and_then(|v| v.parse::<u64>().ok()) {
        if delay > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(delay.min(MAX_DELAY_MS))).await;
        }
    }

    let body = PingResponse {
        status: "ok",
        time: Utc::now().timestamp_millis(),
        server_time: start.elapsed().as_millis() as i64,
    };

    (
        [(header::CACHE_CONTROL, "no-store, no-cache, must-revalidate")],
        Json(body),
    )
        .into_response()
}

/// `GET /ping-test.json`: a minimal timestamped payload so intermediaries
/// cannot serve it from cache, used for latency measurement.
pub async fn ping_test_file() -> Response {
    let start = Instant::now();
    let body = PingTestResponse {
        status: "ok",
        timestamp: Utc::now().timestamp_millis(),
        processing_time: start.elapsed().as_millis() as i64,
    };

    (
        [(header::CACHE_CONTROL, "no-store, no-cache, must-revalidate")],
        Json(body),
    )
        .into_response()
}
