//! The per-key transcode transaction and the failure quarantine path.
//!
//! Step order is strict: observers of `Completed` must find the delivery
//! object in place, observers of `Failed` must find the quarantined copy.
//! Every scratch file lives inside a temp directory that is removed on all
//! exit paths.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use futures::StreamExt;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio_util::io::StreamReader;
use tokio_util::sync::CancellationToken;

use clipstream_core::VideoStatus;
use clipstream_db::CatalogError;
use clipstream_processing::TranscodeError;
use clipstream_storage::{ObjectBody, ObjectEntry, ObjectStream, StorageError};

use crate::scheduler::IngestScheduler;

#[derive(Debug, Error)]
pub(crate) enum ProcessError {
    /// Taking ownership in the catalog failed; the key stays in RAW and the
    /// next scan retries it. Neither retried nor quarantined.
    #[error("status gate failed: {0}")]
    Gate(CatalogError),

    /// Cancellation became visible mid-process; no follow-up writes were
    /// issued and the next startup re-drives the key.
    #[error("cancelled")]
    Cancelled,

    /// Terminal for the asset.
    #[error(transparent)]
    Transcode(TranscodeError),

    #[error(transparent)]
    Storage(StorageError),

    #[error("catalog write failed: {0}")]
    Catalog(CatalogError),

    #[error("scratch file error: {0}")]
    Io(#[from] std::io::Error),
}

/// Delivery thumbnail key: basename of the asset key without its extension,
/// plus `.jpg`.
pub(crate) fn thumbnail_key(key: &str) -> String {
    let base = Path::new(key)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| key.to_string());
    match base.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => format!("{stem}.jpg"),
        _ => format!("{base}.jpg"),
    }
}

async fn spool_to_file(stream: ObjectStream, path: &Path) -> std::io::Result<()> {
    let mut reader = StreamReader::new(stream.map(|chunk| chunk.map_err(std::io::Error::other)));
    let mut file = tokio::fs::File::create(path).await?;
    tokio::io::copy(&mut reader, &mut file).await?;
    file.flush().await?;
    Ok(())
}

impl IngestScheduler {
    /// The transcode transaction for one key.
    pub(crate) async fn process_video(
        &self,
        entry: &ObjectEntry,
        cancel: &CancellationToken,
    ) -> Result<(), ProcessError> {
        let key = &entry.key;

        // Step 1: take ownership in the catalog.
        self.catalog
            .update_status(key, VideoStatus::Processing)
            .await
            .map_err(ProcessError::Gate)?;

        // Step 2: spool the raw object into scratch space.
        let scratch = tempfile::tempdir()?;
        let input = scratch.path().join("input.mp4");

        let stream = match self
            .store
            .get_range(&self.buckets.raw_videos, key, 0, -1)
            .await
        {
            Ok(stream) => stream,
            Err(StorageError::NotFound(_)) => {
                // The raw object is gone. If an earlier attempt already
                // delivered, converge to Completed instead of failing.
                return match self.store.stat(&self.buckets.videos, key).await {
                    Ok(_) => {
                        self.catalog
                            .update_status(key, VideoStatus::Completed)
                            .await
                            .map_err(ProcessError::Catalog)?;
                        tracing::info!(key = %key, "already delivered; catalog converged");
                        Ok(())
                    }
                    Err(_) => {
                        tracing::warn!(key = %key, "raw object vanished before processing");
                        Ok(())
                    }
                };
            }
            Err(e) => return Err(ProcessError::Storage(e)),
        };
        spool_to_file(stream, &input).await?;

        // Step 3: delivery transcode and poster extraction in parallel. The
        // poster is optional; the transcode is not.
        let transcode_task = {
            let transcoder = Arc::clone(&self.transcoder);
            let input = input.clone();
            tokio::spawn(async move { transcoder.transcode(&input).await })
        };
        let poster_task = {
            let transcoder = Arc::clone(&self.transcoder);
            let input = input.clone();
            tokio::spawn(async move { transcoder.extract_poster(&input).await })
        };

        let (transcoded, poster) = tokio::join!(transcode_task, poster_task);
        let video_path = transcoded
            .map_err(|e| ProcessError::Io(std::io::Error::other(e)))?
            .map_err(ProcessError::Transcode)?;
        let poster_path = match poster {
            Ok(Ok(path)) => Some(path),
            Ok(Err(e)) => {
                tracing::warn!(key = %key, error = %e, "poster extraction failed, continuing without thumbnail");
                None
            }
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "poster task failed, continuing without thumbnail");
                None
            }
        };

        // The external process was allowed to finish, but once cancellation
        // is visible no follow-up writes are issued.
        if cancel.is_cancelled() {
            return Err(ProcessError::Cancelled);
        }

        // Step 4: promote into the delivery bucket.
        let metadata = HashMap::from([
            ("original-size".to_string(), entry.size.to_string()),
            ("processed-at".to_string(), Utc::now().to_rfc3339()),
        ]);
        self.store
            .put(
                &self.buckets.videos,
                key,
                ObjectBody::File(video_path),
                -1,
                "video/mp4",
                metadata,
            )
            .await
            .map_err(ProcessError::Storage)?;

        // Step 5: thumbnail upload; delivery already holds, so failure here
        // only costs the poster.
        if let Some(path) = poster_path {
            let metadata = HashMap::from([
                ("video-key".to_string(), key.clone()),
                ("created-at".to_string(), Utc::now().to_rfc3339()),
            ]);
            if let Err(e) = self
                .store
                .put(
                    &self.buckets.thumbnails,
                    &thumbnail_key(key),
                    ObjectBody::File(path),
                    -1,
                    "image/jpeg",
                    metadata,
                )
                .await
            {
                tracing::warn!(key = %key, error = %e, "thumbnail upload failed");
            }
        }

        // Step 6: drop the raw object. No rollback on failure; the delivery
        // bucket is the authority now and the leftover is harmless.
        if let Err(e) = self.store.delete(&self.buckets.raw_videos, key).await {
            tracing::warn!(key = %key, error = %e, "failed to delete raw object");
        }

        // Step 7.
        self.catalog
            .update_status(key, VideoStatus::Completed)
            .await
            .map_err(ProcessError::Catalog)?;

        tracing::info!(key = %key, original_size = entry.size, "video processed");
        Ok(())
        // Step 8: scratch directory drop removes input and outputs.
    }

    /// Failure quarantine: record `Failed`, move the raw object into the
    /// failed bucket, and stop. The status write is best-effort; the move is
    /// what preserves the bytes for inspection.
    pub(crate) async fn quarantine(&self, entry: &ObjectEntry) {
        let key = &entry.key;

        if let Err(e) = self.catalog.update_status(key, VideoStatus::Failed).await {
            tracing::warn!(key = %key, error = %e, "failed to record failed status");
        }

        let moved: Result<(), StorageError> = async {
            let scratch = tempfile::tempdir()?;
            let path = scratch.path().join("failed.bin");
            let stream = self
                .store
                .get_range(&self.buckets.raw_videos, key, 0, -1)
                .await?;
            spool_to_file(stream, &path).await?;

            let metadata = HashMap::from([
                ("original-size".to_string(), entry.size.to_string()),
                ("failed-at".to_string(), Utc::now().to_rfc3339()),
            ]);
            self.store
                .put(
                    &self.buckets.failed,
                    key,
                    ObjectBody::File(path),
                    -1,
                    "application/octet-stream",
                    metadata,
                )
                .await?;
            self.store.delete(&self.buckets.raw_videos, key).await?;
            Ok(())
        }
        .await;

        match moved {
            Ok(()) => tracing::warn!(key = %key, "asset quarantined"),
            Err(e) => {
                tracing::error!(key = %key, error = %e, "quarantine move failed; raw object left in place")
            }
        }
    }
}
