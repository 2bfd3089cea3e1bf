//! Object store bring-up: connect and ensure the owned buckets exist with
//! public-read policies. The profile bucket is externally provisioned and
//! never created here.

use std::sync::Arc;

use anyhow::{Context, Result};

use clipstream_core::Config;
use clipstream_storage::{ObjectStore, S3ObjectStore};

pub async fn setup_storage(config: &Config) -> Result<Arc<dyn ObjectStore>> {
    let store = S3ObjectStore::connect(
        &config.minio_endpoint,
        &config.minio_root_user,
        &config.minio_root_password,
    );

    for bucket in config.buckets.owned() {
        store
            .ensure_bucket(bucket, true)
            .await
            .with_context(|| format!("failed to ensure bucket {bucket}"))?;
    }

    tracing::info!(
        videos = %config.buckets.videos,
        raw_videos = %config.buckets.raw_videos,
        "object store ready"
    );
    Ok(Arc::new(store))
}
