//! In-memory catalog for hermetic tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use clipstream_core::VideoStatus;

use crate::catalog::{CatalogError, CatalogResult, VideoCatalog};

#[derive(Clone, Default)]
pub struct MemoryCatalog {
    rows: Arc<Mutex<HashMap<String, VideoStatus>>>,
    fail_updates: Arc<AtomicU32>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a row the way the out-of-band uploader would.
    pub fn seed(&self, key: &str, status: VideoStatus) {
        self.rows
            .lock()
            .unwrap()
            .insert(key.to_string(), status);
    }

    pub fn status_of(&self, key: &str) -> VideoStatus {
        self.rows
            .lock()
            .unwrap()
            .get(key)
            .copied()
            .unwrap_or(VideoStatus::Unknown)
    }

    /// Make the next `n` `update_status` calls fail with a transport error.
    pub fn inject_update_errors(&self, n: u32) {
        self.fail_updates.store(n, Ordering::SeqCst);
    }

    fn take_fault(&self) -> bool {
        self.fail_updates
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl VideoCatalog for MemoryCatalog {
    async fn get_status(&self, key: &str) -> CatalogResult<VideoStatus> {
        Ok(self.status_of(key))
    }

    async fn insert(&self, key: &str, status: VideoStatus) -> CatalogResult<()> {
        self.seed(key, status);
        Ok(())
    }

    async fn update_status(&self, key: &str, status: VideoStatus) -> CatalogResult<()> {
        if self.take_fault() {
            return Err(CatalogError::Database(sqlx::Error::PoolTimedOut));
        }
        let mut rows = self.rows.lock().unwrap();
        match rows.get_mut(key) {
            Some(row) => {
                *row = status;
                Ok(())
            }
            None => Err(CatalogError::NotFound(key.to_string())),
        }
    }

    async fn list_by_status(&self, status: VideoStatus) -> CatalogResult<Vec<String>> {
        let rows = self.rows.lock().unwrap();
        let mut keys: Vec<String> = rows
            .iter()
            .filter(|(_, s)| **s == status)
            .map(|(k, _)| k.clone())
            .collect();
        keys.sort();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_row_reads_as_unknown() {
        let catalog = MemoryCatalog::new();
        assert_eq!(
            catalog.get_status("missing.mp4").await.unwrap(),
            VideoStatus::Unknown
        );
    }

    #[tokio::test]
    async fn repeated_insert_keeps_a_single_row() {
        let catalog = MemoryCatalog::new();
        catalog.insert("a.mp4", VideoStatus::Pending).await.unwrap();
        catalog.insert("a.mp4", VideoStatus::Pending).await.unwrap();
        assert_eq!(
            catalog.list_by_status(VideoStatus::Pending).await.unwrap(),
            vec!["a.mp4".to_string()]
        );
    }

    #[tokio::test]
    async fn update_of_missing_row_is_not_found() {
        let catalog = MemoryCatalog::new();
        assert!(matches!(
            catalog.update_status("a.mp4", VideoStatus::Completed).await,
            Err(CatalogError::NotFound(_))
        ));
    }
}
