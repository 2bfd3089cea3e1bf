//! HTTP surface tests over in-memory backends: lifecycle metadata mapping,
//! RFC 7233 range delivery, static assets, and CORS.

use std::sync::Arc;

use axum_test::TestServer;
use bytes::Bytes;
use serde_json::Value;

use clipstream_api::setup::routes::build_router;
use clipstream_api::state::AppState;
use clipstream_core::{Buckets, VideoStatus};
use clipstream_db::MemoryCatalog;
use clipstream_storage::MemoryObjectStore;

const VIDEOS: &str = "videos";
const THUMBS: &str = "thumbnails";
const PROFILES: &str = "profiles";

struct TestApp {
    server: TestServer,
    store: MemoryObjectStore,
    catalog: MemoryCatalog,
}

fn setup() -> TestApp {
    let store = MemoryObjectStore::with_buckets(&[VIDEOS, "raw-videos", "failed", THUMBS, PROFILES]);
    let catalog = MemoryCatalog::new();
    let state = AppState {
        store: Arc::new(store.clone()),
        catalog: Arc::new(catalog.clone()),
        buckets: Buckets {
            videos: VIDEOS.to_string(),
            raw_videos: "raw-videos".to_string(),
            failed: "failed".to_string(),
            thumbnails: THUMBS.to_string(),
            profiles: Some(PROFILES.to_string()),
        },
    };
    let server = TestServer::new(build_router(state)).expect("failed to build test server");
    TestApp {
        server,
        store,
        catalog,
    }
}

fn header<'a>(response: &'a axum_test::TestResponse, name: &str) -> &'a str {
    response
        .headers()
        .get(name)
        .unwrap_or_else(|| panic!("missing header {name}"))
        .to_str()
        .unwrap()
}

#[tokio::test]
async fn ping_reports_ok_with_no_store_headers() {
    let app = setup();
    let response = app.server.get("/ping").await;
    assert_eq!(response.status_code(), 200);
    let body: Value = response.json();
    assert_eq!(body["status"], "ok");
    assert!(body["time"].as_i64().is_some());
    assert!(header(&response, "cache-control").contains("no-store"));
}

#[tokio::test]
async fn metadata_without_catalog_row_is_not_found() {
    let app = setup();
    let response = app.server.get("/api/videos/missing.mp4").await;
    assert_eq!(response.status_code(), 404);
    let body: Value = response.json();
    assert_eq!(body["status"], "not_found");
}

#[tokio::test]
async fn metadata_reflects_pending_and_processing_and_failed() {
    let app = setup();

    app.catalog.seed("a.mp4", VideoStatus::Pending);
    let response = app.server.get("/api/videos/a.mp4").await;
    assert_eq!(response.status_code(), 202);
    assert_eq!(response.json::<Value>()["status"], "pending");

    app.catalog.seed("a.mp4", VideoStatus::Processing);
    let response = app.server.get("/api/videos/a.mp4").await;
    assert_eq!(response.status_code(), 202);
    assert_eq!(response.json::<Value>()["status"], "processing");

    app.catalog.seed("a.mp4", VideoStatus::Failed);
    let response = app.server.get("/api/videos/a.mp4").await;
    assert_eq!(response.status_code(), 422);
    assert_eq!(response.json::<Value>()["status"], "failed");
}

#[tokio::test]
async fn metadata_for_completed_video_carries_delivery_details() {
    let app = setup();
    app.catalog.seed("a1.mp4", VideoStatus::Completed);
    app.store
        .insert_object(VIDEOS, "a1.mp4", &b"mp4-bytes"[..], "video/mp4");

    let response = app.server.get("/api/videos/a1.mp4").await;
    assert_eq!(response.status_code(), 200);
    let body: Value = response.json();
    assert_eq!(body["status"], "completed");
    assert_eq!(body["data"]["size"], 9);
    assert_eq!(body["data"]["contentType"], "video/mp4");
    assert_eq!(body["data"]["filePath"], "a1.mp4");
    assert_eq!(body["data"]["cdnUrl"], "/video/a1.mp4");
}

#[tokio::test]
async fn metadata_for_completed_video_without_object_is_not_found() {
    let app = setup();
    app.catalog.seed("gone.mp4", VideoStatus::Completed);

    let response = app.server.get("/api/videos/gone.mp4").await;
    assert_eq!(response.status_code(), 404);
    assert_eq!(response.json::<Value>()["status"], "not_found");
}

#[tokio::test]
async fn full_reads_carry_accept_ranges_and_length() {
    let app = setup();
    let payload = vec![7u8; 4096];
    app.store
        .insert_object(VIDEOS, "a1.mp4", payload.clone(), "video/mp4");

    let response = app.server.get("/video/a1.mp4").await;
    assert_eq!(response.status_code(), 200);
    assert_eq!(header(&response, "accept-ranges"), "bytes");
    assert_eq!(header(&response, "content-length"), "4096");
    assert_eq!(header(&response, "content-type"), "video/mp4");
    assert_eq!(response.as_bytes().as_ref(), payload.as_slice());
}

#[tokio::test]
async fn single_byte_range_returns_206_with_content_range() {
    let app = setup();
    app.store
        .insert_object(VIDEOS, "a1.mp4", &b"0123456789"[..], "video/mp4");

    let response = app
        .server
        .get("/video/a1.mp4")
        .add_header("Range", "bytes=0-0")
        .await;
    assert_eq!(response.status_code(), 206);
    assert_eq!(header(&response, "content-range"), "bytes 0-0/10");
    assert_eq!(header(&response, "content-length"), "1");
    assert_eq!(response.as_bytes().as_ref(), b"0");
}

#[tokio::test]
async fn open_ended_range_runs_to_the_last_byte() {
    let app = setup();
    app.store
        .insert_object(VIDEOS, "a1.mp4", &b"0123456789"[..], "video/mp4");

    let response = app
        .server
        .get("/video/a1.mp4")
        .add_header("Range", "bytes=7-")
        .await;
    assert_eq!(response.status_code(), 206);
    assert_eq!(header(&response, "content-range"), "bytes 7-9/10");
    assert_eq!(response.as_bytes().as_ref(), b"789");
}

#[tokio::test]
async fn out_of_bounds_range_is_unsatisfiable() {
    let app = setup();
    app.store
        .insert_object(VIDEOS, "a1.mp4", &b"0123456789"[..], "video/mp4");

    let response = app
        .server
        .get("/video/a1.mp4")
        .add_header("Range", "bytes=11-")
        .await;
    assert_eq!(response.status_code(), 416);
    assert_eq!(header(&response, "content-range"), "bytes */10");
}

#[tokio::test]
async fn missing_video_is_404() {
    let app = setup();
    let response = app.server.get("/video/nope.mp4").await;
    assert_eq!(response.status_code(), 404);
}

#[tokio::test]
async fn overlapping_ranges_reassemble_the_object() {
    let app = setup();
    let payload: Vec<u8> = (0..65536u32).map(|i| (i % 251) as u8).collect();
    app.store
        .insert_object(VIDEOS, "big.mp4", payload.clone(), "video/mp4");

    let mut reassembled = vec![0u8; payload.len()];
    let window = 4096i64;
    let step = 3000i64; // overlapping windows
    let mut start = 0i64;
    while start < payload.len() as i64 {
        let end = (start + window - 1).min(payload.len() as i64 - 1);
        let response = app
            .server
            .get("/video/big.mp4")
            .add_header("Range", format!("bytes={start}-{end}"))
            .await;
        assert_eq!(response.status_code(), 206);
        let body = response.as_bytes();
        assert_eq!(body.len() as i64, end - start + 1);
        reassembled[start as usize..=(end as usize)].copy_from_slice(body.as_ref());
        start += step;
    }

    assert_eq!(reassembled, payload);
}

#[tokio::test]
async fn hls_manifests_get_short_lived_cache_control() {
    let app = setup();
    app.store.insert_object(
        VIDEOS,
        "stream.m3u8",
        &b"#EXTM3U\n#EXT-X-VERSION:3\n"[..],
        "",
    );

    let response = app.server.get("/video/stream.m3u8").await;
    assert_eq!(response.status_code(), 200);
    assert_eq!(
        header(&response, "content-type"),
        "application/vnd.apple.mpegurl"
    );
    assert_eq!(
        header(&response, "cache-control"),
        "public, max-age=10, must-revalidate"
    );
}

#[tokio::test]
async fn hls_segments_stream_without_declared_length() {
    let app = setup();
    app.store
        .insert_object(VIDEOS, "seg0.ts", vec![1u8; 1024], "video/MP2T");

    let response = app.server.get("/video/seg0.ts").await;
    assert_eq!(response.status_code(), 200);
    assert_eq!(header(&response, "content-type"), "video/MP2T");
    assert!(response.headers().get("content-length").is_none());
    assert_eq!(response.as_bytes().len(), 1024);
}

#[tokio::test]
async fn nocache_query_disables_caching() {
    let app = setup();
    app.store
        .insert_object(VIDEOS, "a1.mp4", &b"bytes"[..], "video/mp4");

    let response = app
        .server
        .get("/video/a1.mp4")
        .add_query_param("nocache", "1")
        .await;
    assert!(header(&response, "cache-control").contains("no-store"));
    assert!(response.headers().get("expires").is_none());
}

#[tokio::test]
async fn thumbnails_are_served_as_jpeg() {
    let app = setup();
    app.store
        .insert_object(THUMBS, "a1.jpg", &b"jpeg-bytes"[..], "image/jpeg");

    let response = app.server.get("/video/thumbnail/a1.jpg").await;
    assert_eq!(response.status_code(), 200);
    assert_eq!(header(&response, "content-type"), "image/jpeg");
    assert_eq!(header(&response, "content-length"), "10");
    assert_eq!(response.as_bytes().as_ref(), b"jpeg-bytes");

    let missing = app.server.get("/video/thumbnail/none.jpg").await;
    assert_eq!(missing.status_code(), 404);
}

#[tokio::test]
async fn profile_lookup_walks_patterns_then_falls_back_to_default() {
    let app = setup();
    app.store.insert_object(
        PROFILES,
        "profile-pictures/user_bob.png",
        &b"png-bytes"[..],
        "image/png",
    );
    app.store.insert_object(
        PROFILES,
        "profile-pictures/default.jpg",
        &b"default-bytes"[..],
        "image/jpeg",
    );

    let response = app.server.get("/profile-pictures/bob").await;
    assert_eq!(response.status_code(), 200);
    assert_eq!(header(&response, "content-type"), "image/png");
    assert_eq!(response.as_bytes().as_ref(), b"png-bytes");

    let fallback = app.server.get("/profile-pictures/nobody").await;
    assert_eq!(fallback.status_code(), 200);
    assert_eq!(header(&fallback, "content-type"), "image/jpeg");
    assert_eq!(fallback.as_bytes().as_ref(), b"default-bytes");
    assert_eq!(header(&fallback, "cache-control"), "public, max-age=86400");
}

#[tokio::test]
async fn preflight_requests_get_permissive_cors() {
    let app = setup();
    let response = app
        .server
        .method(http::Method::OPTIONS, "/video/a1.mp4")
        .add_header("Origin", "https://example.com")
        .add_header("Access-Control-Request-Method", "GET")
        .await;
    assert_eq!(response.status_code(), 200);
    assert_eq!(header(&response, "access-control-allow-origin"), "*");
    assert!(header(&response, "access-control-allow-methods").contains("GET"));
}

#[tokio::test]
async fn simple_requests_carry_cors_headers() {
    let app = setup();
    app.store
        .insert_object(VIDEOS, "a1.mp4", Bytes::from_static(b"x"), "video/mp4");

    let response = app
        .server
        .get("/video/a1.mp4")
        .add_header("Origin", "https://example.com")
        .await;
    assert_eq!(response.status_code(), 200);
    assert_eq!(header(&response, "access-control-allow-origin"), "*");
}
