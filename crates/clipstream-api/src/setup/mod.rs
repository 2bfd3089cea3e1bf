//! Application bootstrap: object store, catalog, routes, and the ingest
//! scheduler, wired in dependency order.

pub mod database;
pub mod routes;
pub mod server;
pub mod storage;

use std::sync::Arc;

use anyhow::Result;
use axum::Router;
use sqlx::PgPool;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use clipstream_core::Config;
use clipstream_db::{PgCatalog, VideoCatalog};
use clipstream_processing::{FfmpegTranscoder, Transcoder};
use clipstream_worker::{IngestScheduler, SchedulerConfig};

use crate::state::AppState;

/// Everything `main` needs to run and later tear down the node.
pub struct BootstrappedApp {
    pub router: Router,
    pub pool: PgPool,
    pub cancel: CancellationToken,
    pub scheduler: JoinHandle<()>,
}

pub async fn initialize_app(config: Config) -> Result<BootstrappedApp> {
    let store = storage::setup_storage(&config).await?;
    let pool = database::setup_database(&config).await?;
    let catalog: Arc<dyn VideoCatalog> = Arc::new(PgCatalog::new(pool.clone()));

    let state = AppState {
        store: store.clone(),
        catalog: catalog.clone(),
        buckets: config.buckets.clone(),
    };
    let router = routes::build_router(state);

    let transcoder: Arc<dyn Transcoder> =
        Arc::new(FfmpegTranscoder::new(config.ffmpeg_path.clone()));
    let scheduler = IngestScheduler::new(
        store,
        catalog,
        transcoder,
        config.buckets.clone(),
        SchedulerConfig::from(config.ingest.clone()),
    );

    let cancel = CancellationToken::new();
    let scheduler = scheduler.spawn(cancel.clone());

    Ok(BootstrappedApp {
        router,
        pool,
        cancel,
        scheduler,
    })
}
