//! Storage abstraction trait
//!
//! The scheduler and the HTTP surface both talk to buckets through this
//! trait; the production backend is a remote S3-compatible store.

use std::collections::HashMap;
use std::path::PathBuf;
use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use thiserror::Error;

/// Storage operation errors, split along the retryable/terminal boundary:
/// `NotFound` is terminal for a request, everything else is transport.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("object not found: {0}")]
    NotFound(String),

    #[error("storage transport error: {0}")]
    Transport(String),

    #[error("local io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Byte stream handed to callers; the caller owns it and drops it to close.
pub type ObjectStream = Pin<Box<dyn Stream<Item = StorageResult<Bytes>> + Send>>;

/// Subset of object metadata the node cares about.
#[derive(Clone, Debug)]
pub struct ObjectInfo {
    pub size: i64,
    pub content_type: Option<String>,
}

/// One listing entry.
#[derive(Clone, Debug)]
pub struct ObjectEntry {
    pub key: String,
    pub size: i64,
}

/// Payload for uploads. Large files are handed over by path so the backend
/// can stream them without buffering.
#[derive(Debug)]
pub enum ObjectBody {
    File(PathBuf),
    Bytes(Bytes),
}

/// Uniform read/write/list/stat/delete over named buckets.
///
/// Operations are independent; there are no transactions across buckets.
/// Range semantics follow RFC 7233: inclusive `[start, end]`, `end = -1`
/// meaning open-ended, `end` capped at `size - 1` by the backend.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn stat(&self, bucket: &str, key: &str) -> StorageResult<ObjectInfo>;

    /// Stream `[start, end]` of an object. `start = 0, end = -1` reads the
    /// whole object.
    async fn get_range(
        &self,
        bucket: &str,
        key: &str,
        start: i64,
        end: i64,
    ) -> StorageResult<ObjectStream>;

    async fn list(&self, bucket: &str) -> StorageResult<Vec<ObjectEntry>>;

    /// Upload an object. `size_hint = -1` permits unknown length; the
    /// backend derives the real length from the body where it can.
    async fn put(
        &self,
        bucket: &str,
        key: &str,
        body: ObjectBody,
        size_hint: i64,
        content_type: &str,
        metadata: HashMap<String, String>,
    ) -> StorageResult<()>;

    async fn delete(&self, bucket: &str, key: &str) -> StorageResult<()>;

    /// Idempotent bucket creation, optionally applying a public-read policy
    /// to a freshly created bucket. Retries with exponential backoff until a
    /// 30-second wall-clock deadline, then fails hard.
    async fn ensure_bucket(&self, bucket: &str, public_read: bool) -> StorageResult<()>;
}

/// Builds the RFC 7233 `Range` request value for an inclusive byte window.
/// Returns `None` when the window covers the whole object.
pub(crate) fn range_header_value(start: i64, end: i64) -> Option<String> {
    if start <= 0 && end < 0 {
        return None;
    }
    if end < 0 {
        Some(format!("bytes={start}-"))
    } else {
        Some(format!("bytes={start}-{end}"))
    }
}
