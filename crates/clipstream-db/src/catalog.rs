//! `VideoCatalog` trait and its Postgres implementation.
//!
//! The scheduler uses the catalog idempotently: every write can be replayed
//! after a crash, and a reconciliation pass on restart may re-drive a key.

use std::time::Duration;

use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use thiserror::Error;

use clipstream_core::VideoStatus;

const CONNECT_RETRY_INTERVAL: Duration = Duration::from_secs(5);
const MAX_CONNECTIONS: u32 = 20;
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum CatalogError {
    /// The row vanished between sighting and update.
    #[error("no video row for key {0}")]
    NotFound(String),

    #[error("catalog query failed: {0}")]
    Database(#[from] sqlx::Error),
}

pub type CatalogResult<T> = Result<T, CatalogError>;

/// Durable lifecycle state for assets, keyed by file path.
#[async_trait]
pub trait VideoCatalog: Send + Sync {
    /// A missing row is `Unknown`, not an error: only transport failures
    /// surface as `Err`.
    async fn get_status(&self, key: &str) -> CatalogResult<VideoStatus>;

    /// Idempotent upsert keyed by file path; a conflict updates the status.
    async fn insert(&self, key: &str, status: VideoStatus) -> CatalogResult<()>;

    /// Fails with `NotFound` when no row matches the key.
    async fn update_status(&self, key: &str, status: VideoStatus) -> CatalogResult<()>;

    async fn list_by_status(&self, status: VideoStatus) -> CatalogResult<Vec<String>>;
}

/// Connect to the catalog, retrying indefinitely. The node is unusable
/// without it, and transient unavailability at start must not crash.
pub async fn connect_with_retry(dsn: &str) -> PgPool {
    loop {
        match PgPoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .acquire_timeout(ACQUIRE_TIMEOUT)
            .connect(dsn)
            .await
        {
            Ok(pool) => {
                tracing::info!("connected to catalog database");
                return pool;
            }
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    retry_secs = CONNECT_RETRY_INTERVAL.as_secs(),
                    "catalog connection failed, retrying"
                );
                tokio::time::sleep(CONNECT_RETRY_INTERVAL).await;
            }
        }
    }
}

#[derive(Clone)]
pub struct PgCatalog {
    pool: PgPool,
}

impl PgCatalog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl VideoCatalog for PgCatalog {
    async fn get_status(&self, key: &str) -> CatalogResult<VideoStatus> {
        let status: Option<i16> =
            sqlx::query_scalar("SELECT status FROM video WHERE file_path = $1")
                .bind(key)
                .fetch_optional(&self.pool)
                .await?;

        Ok(status.map(VideoStatus::from_i16).unwrap_or(VideoStatus::Unknown))
    }

    async fn insert(&self, key: &str, status: VideoStatus) -> CatalogResult<()> {
        sqlx::query(
            "INSERT INTO video (file_path, status) VALUES ($1, $2) \
             ON CONFLICT (file_path) DO UPDATE SET status = EXCLUDED.status",
        )
        .bind(key)
        .bind(status.as_i16())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_status(&self, key: &str, status: VideoStatus) -> CatalogResult<()> {
        let result = sqlx::query("UPDATE video SET status = $1 WHERE file_path = $2")
            .bind(status.as_i16())
            .bind(key)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(CatalogError::NotFound(key.to_string()));
        }
        Ok(())
    }

    async fn list_by_status(&self, status: VideoStatus) -> CatalogResult<Vec<String>> {
        let keys: Vec<String> = sqlx::query_scalar("SELECT file_path FROM video WHERE status = $1")
            .bind(status.as_i16())
            .fetch_all(&self.pool)
            .await?;
        Ok(keys)
    }
}
