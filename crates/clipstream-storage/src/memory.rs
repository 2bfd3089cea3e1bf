//! In-memory object store for hermetic tests. Implements the same range and
//! not-found semantics as the remote backend, plus simple fault injection
//! for retry-path tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;

use crate::traits::{
    ObjectBody, ObjectEntry, ObjectInfo, ObjectStore, ObjectStream, StorageError, StorageResult,
};

#[derive(Clone, Debug)]
pub struct StoredObject {
    pub data: Bytes,
    pub content_type: String,
    pub metadata: HashMap<String, String>,
}

#[derive(Default)]
struct State {
    buckets: HashSet<String>,
    objects: HashMap<(String, String), StoredObject>,
}

#[derive(Clone, Default)]
pub struct MemoryObjectStore {
    state: Arc<Mutex<State>>,
    fail_gets: Arc<AtomicU32>,
    fail_puts: Arc<AtomicU32>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_buckets(buckets: &[&str]) -> Self {
        let store = Self::new();
        {
            let mut state = store.state.lock().unwrap();
            for bucket in buckets {
                state.buckets.insert(bucket.to_string());
            }
        }
        store
    }

    /// Seed an object directly, bypassing the trait.
    pub fn insert_object(&self, bucket: &str, key: &str, data: impl Into<Bytes>, content_type: &str) {
        let mut state = self.state.lock().unwrap();
        state.buckets.insert(bucket.to_string());
        state.objects.insert(
            (bucket.to_string(), key.to_string()),
            StoredObject {
                data: data.into(),
                content_type: content_type.to_string(),
                metadata: HashMap::new(),
            },
        );
    }

    pub fn object(&self, bucket: &str, key: &str) -> Option<StoredObject> {
        self.state
            .lock()
            .unwrap()
            .objects
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
    }

    pub fn contains(&self, bucket: &str, key: &str) -> bool {
        self.object(bucket, key).is_some()
    }

    pub fn has_bucket(&self, bucket: &str) -> bool {
        self.state.lock().unwrap().buckets.contains(bucket)
    }

    /// Make the next `n` `get_range` calls fail with a transport error.
    pub fn inject_get_errors(&self, n: u32) {
        self.fail_gets.store(n, Ordering::SeqCst);
    }

    /// Make the next `n` `put` calls fail with a transport error.
    pub fn inject_put_errors(&self, n: u32) {
        self.fail_puts.store(n, Ordering::SeqCst);
    }

    fn take_fault(counter: &AtomicU32) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn stat(&self, bucket: &str, key: &str) -> StorageResult<ObjectInfo> {
        let state = self.state.lock().unwrap();
        match state.objects.get(&(bucket.to_string(), key.to_string())) {
            Some(object) => Ok(ObjectInfo {
                size: object.data.len() as i64,
                content_type: Some(object.content_type.clone()),
            }),
            None => Err(StorageError::NotFound(format!("{bucket}/{key}"))),
        }
    }

    async fn get_range(
        &self,
        bucket: &str,
        key: &str,
        start: i64,
        end: i64,
    ) -> StorageResult<ObjectStream> {
        if Self::take_fault(&self.fail_gets) {
            return Err(StorageError::Transport("injected get failure".into()));
        }

        let data = {
            let state = self.state.lock().unwrap();
            state
                .objects
                .get(&(bucket.to_string(), key.to_string()))
                .map(|o| o.data.clone())
                .ok_or_else(|| StorageError::NotFound(format!("{bucket}/{key}")))?
        };

        let size = data.len() as i64;
        let start = start.max(0);
        let end = if end < 0 { size - 1 } else { end.min(size - 1) };
        let slice = if start > end || size == 0 {
            Bytes::new()
        } else {
            data.slice(start as usize..=(end as usize))
        };

        Ok(Box::pin(futures::stream::iter([Ok(slice)])))
    }

    async fn list(&self, bucket: &str) -> StorageResult<Vec<ObjectEntry>> {
        let state = self.state.lock().unwrap();
        let mut entries: Vec<ObjectEntry> = state
            .objects
            .iter()
            .filter(|((b, _), _)| b == bucket)
            .map(|((_, key), object)| ObjectEntry {
                key: key.clone(),
                size: object.data.len() as i64,
            })
            .collect();
        entries.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(entries)
    }

    async fn put(
        &self,
        bucket: &str,
        key: &str,
        body: ObjectBody,
        _size_hint: i64,
        content_type: &str,
        metadata: HashMap<String, String>,
    ) -> StorageResult<()> {
        if Self::take_fault(&self.fail_puts) {
            return Err(StorageError::Transport("injected put failure".into()));
        }

        let data = match body {
            ObjectBody::Bytes(bytes) => bytes,
            ObjectBody::File(path) => Bytes::from(tokio::fs::read(&path).await?),
        };

        let mut state = self.state.lock().unwrap();
        state.objects.insert(
            (bucket.to_string(), key.to_string()),
            StoredObject {
                data,
                content_type: content_type.to_string(),
                metadata,
            },
        );
        Ok(())
    }

    async fn delete(&self, bucket: &str, key: &str) -> StorageResult<()> {
        let mut state = self.state.lock().unwrap();
        state.objects.remove(&(bucket.to_string(), key.to_string()));
        Ok(())
    }

    async fn ensure_bucket(&self, bucket: &str, _public_read: bool) -> StorageResult<()> {
        self.state
            .lock()
            .unwrap()
            .buckets
            .insert(bucket.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    async fn collect(mut stream: ObjectStream) -> Vec<u8> {
        let mut out = Vec::new();
        while let Some(chunk) = stream.next().await {
            out.extend_from_slice(&chunk.unwrap());
        }
        out
    }

    #[tokio::test]
    async fn range_reads_are_inclusive_and_clamped() {
        let store = MemoryObjectStore::new();
        store.insert_object("videos", "a.mp4", &b"0123456789"[..], "video/mp4");

        let full = collect(store.get_range("videos", "a.mp4", 0, -1).await.unwrap()).await;
        assert_eq!(full, b"0123456789");

        let first = collect(store.get_range("videos", "a.mp4", 0, 0).await.unwrap()).await;
        assert_eq!(first, b"0");

        let tail = collect(store.get_range("videos", "a.mp4", 7, 100).await.unwrap()).await;
        assert_eq!(tail, b"789");
    }

    #[tokio::test]
    async fn missing_objects_are_not_found() {
        let store = MemoryObjectStore::new();
        assert!(matches!(
            store.stat("videos", "nope").await,
            Err(StorageError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn ensure_bucket_is_idempotent() {
        let store = MemoryObjectStore::new();
        store.ensure_bucket("videos", true).await.unwrap();
        store.ensure_bucket("videos", true).await.unwrap();
        assert!(store.has_bucket("videos"));
    }

    #[tokio::test]
    async fn injected_faults_are_consumed() {
        let store = MemoryObjectStore::new();
        store.insert_object("videos", "a.mp4", &b"x"[..], "video/mp4");
        store.inject_get_errors(1);
        assert!(store.get_range("videos", "a.mp4", 0, -1).await.is_err());
        assert!(store.get_range("videos", "a.mp4", 0, -1).await.is_ok());
    }
}
