//! Discovery loop, worker pool, and retry policy.
//!
//! One discovery task lists the raw bucket on a fixed interval and feeds a
//! bounded channel; W workers drain it. The in-flight set is the only shared
//! mutable state and guarantees at most one concurrent transcode per key
//! within this node.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use clipstream_core::{Buckets, IngestSettings, VideoStatus};
use clipstream_db::VideoCatalog;
use clipstream_processing::Transcoder;
use clipstream_storage::{ObjectEntry, ObjectStore, StorageError};

use crate::pipeline::ProcessError;

/// Cap on exponential retry backoff so high attempt counts do not produce
/// excessively long delays.
const MAX_RETRY_BACKOFF: Duration = Duration::from_secs(300);

#[derive(Clone, Debug)]
pub struct SchedulerConfig {
    /// Worker pool size; the work channel holds twice this many entries.
    pub workers: usize,
    pub scan_interval: Duration,
    /// Attempts per key before the failure quarantine path runs.
    pub max_retries: u32,
    pub retry_base: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            workers: num_cpus::get(),
            scan_interval: Duration::from_secs(30),
            max_retries: 3,
            retry_base: Duration::from_secs(1),
        }
    }
}

impl From<IngestSettings> for SchedulerConfig {
    fn from(settings: IngestSettings) -> Self {
        Self {
            workers: settings.workers.max(1),
            scan_interval: settings.scan_interval,
            max_retries: settings.max_retries.max(1),
            ..Self::default()
        }
    }
}

pub(crate) fn retry_backoff(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(2u32.saturating_pow(attempt))
        .min(MAX_RETRY_BACKOFF)
}

pub struct IngestScheduler {
    pub(crate) store: Arc<dyn ObjectStore>,
    pub(crate) catalog: Arc<dyn VideoCatalog>,
    pub(crate) transcoder: Arc<dyn Transcoder>,
    pub(crate) buckets: Buckets,
    pub(crate) config: SchedulerConfig,
    in_flight: DashMap<String, ()>,
}

impl IngestScheduler {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        catalog: Arc<dyn VideoCatalog>,
        transcoder: Arc<dyn Transcoder>,
        buckets: Buckets,
        config: SchedulerConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            store,
            catalog,
            transcoder,
            buckets,
            config,
            in_flight: DashMap::new(),
        })
    }

    /// Spawn the scheduler. The returned handle resolves once discovery has
    /// stopped and every worker has drained.
    pub fn spawn(self: Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move { self.run(cancel).await })
    }

    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        self.recover().await;

        let (tx, rx) = mpsc::channel::<ObjectEntry>(self.config.workers * 2);
        let rx = Arc::new(tokio::sync::Mutex::new(rx));

        let mut workers = Vec::with_capacity(self.config.workers);
        for worker_id in 0..self.config.workers {
            let scheduler = Arc::clone(&self);
            let rx = Arc::clone(&rx);
            let cancel = cancel.clone();
            workers.push(tokio::spawn(async move {
                scheduler.worker_loop(worker_id, rx, cancel).await;
            }));
        }

        tracing::info!(
            workers = self.config.workers,
            scan_interval_secs = self.config.scan_interval.as_secs(),
            bucket = %self.buckets.raw_videos,
            "ingest scheduler started"
        );

        self.discovery_loop(tx, &cancel).await;

        // The sender is gone; workers exit once the channel is drained.
        for worker in workers {
            if let Err(e) = worker.await {
                tracing::error!(error = %e, "ingest worker panicked");
            }
        }
        tracing::info!("ingest scheduler stopped");
    }

    /// Lists the raw bucket on every tick and enqueues unclaimed keys.
    /// Enqueue blocks on backpressure until a worker accepts or the node is
    /// cancelled. Listing errors are logged and swallowed; the next tick
    /// retries.
    async fn discovery_loop(&self, tx: mpsc::Sender<ObjectEntry>, cancel: &CancellationToken) {
        let mut ticker = tokio::time::interval(self.config.scan_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = ticker.tick() => {}
            }

            let entries = match self.store.list(&self.buckets.raw_videos).await {
                Ok(entries) => entries,
                Err(e) => {
                    tracing::warn!(error = %e, bucket = %self.buckets.raw_videos, "raw bucket listing failed");
                    continue;
                }
            };

            for entry in entries {
                // Claim the key before the channel hop; claiming after would
                // let two consecutive ticks enqueue the same key.
                if self.in_flight.insert(entry.key.clone(), ()).is_some() {
                    continue;
                }
                let key = entry.key.clone();
                tokio::select! {
                    sent = tx.send(entry) => {
                        if sent.is_err() {
                            self.in_flight.remove(&key);
                            return;
                        }
                    }
                    _ = cancel.cancelled() => {
                        self.in_flight.remove(&key);
                        return;
                    }
                }
            }
        }
    }

    async fn worker_loop(
        &self,
        worker_id: usize,
        rx: Arc<tokio::sync::Mutex<mpsc::Receiver<ObjectEntry>>>,
        cancel: CancellationToken,
    ) {
        loop {
            let entry = { rx.lock().await.recv().await };
            let Some(entry) = entry else { break };

            if cancel.is_cancelled() {
                // Drain without processing; claims are released so the next
                // startup re-discovers the keys.
                self.in_flight.remove(&entry.key);
                continue;
            }

            self.handle_entry(entry, &cancel).await;
        }
        tracing::debug!(worker_id, "ingest worker exiting");
    }

    async fn handle_entry(&self, entry: ObjectEntry, cancel: &CancellationToken) {
        let key = entry.key.clone();
        let mut attempt: u32 = 0;

        loop {
            if cancel.is_cancelled() {
                break;
            }

            // Re-read lifecycle state before every attempt so out-of-band
            // changes are honored between retries.
            match self.catalog.get_status(&key).await {
                Ok(VideoStatus::Unknown) => {
                    tracing::debug!(key = %key, "uncatalogued upload, skipping");
                    break;
                }
                Ok(VideoStatus::Failed) => {
                    // A raw object with a terminal Failed row means an earlier
                    // quarantine move was interrupted; finish it rather than
                    // re-entering the transcode path.
                    tracing::warn!(key = %key, "failed asset still in raw bucket; completing quarantine");
                    self.quarantine(&entry).await;
                    break;
                }
                Ok(VideoStatus::Completed) => {
                    match self.store.stat(&self.buckets.videos, &key).await {
                        Ok(_) => {
                            // Delivered but the raw cleanup never ran.
                            if let Err(e) =
                                self.store.delete(&self.buckets.raw_videos, &key).await
                            {
                                tracing::warn!(key = %key, error = %e, "failed to delete raw copy of completed asset");
                            }
                            break;
                        }
                        // Delivery object vanished out from under a completed
                        // row; fall through and rebuild it from the raw copy.
                        Err(StorageError::NotFound(_)) => {}
                        Err(e) => {
                            attempt += 1;
                            tracing::warn!(key = %key, error = %e, attempt, "delivery stat failed");
                            if attempt >= self.config.max_retries {
                                break;
                            }
                            if !self.sleep_backoff(attempt, cancel).await {
                                break;
                            }
                            continue;
                        }
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    attempt += 1;
                    tracing::warn!(key = %key, error = %e, attempt, "catalog status read failed");
                    if attempt >= self.config.max_retries {
                        // Catalog unavailability never quarantines an asset:
                        // the key stays in RAW and the next scan retries it.
                        break;
                    }
                    if !self.sleep_backoff(attempt, cancel).await {
                        break;
                    }
                    continue;
                }
            }

            match self.process_video(&entry, cancel).await {
                Ok(()) => break,
                Err(ProcessError::Cancelled) => {
                    tracing::info!(key = %key, "cancelled mid-process; the next startup re-drives this key");
                    break;
                }
                Err(ProcessError::Gate(e)) => {
                    tracing::warn!(key = %key, error = %e, "could not take ownership; retrying on next scan");
                    break;
                }
                Err(ProcessError::Transcode(e)) => {
                    tracing::error!(key = %key, error = %e, "transcode failed");
                    self.quarantine(&entry).await;
                    break;
                }
                Err(e) => {
                    attempt += 1;
                    tracing::warn!(
                        key = %key,
                        error = %e,
                        attempt,
                        max_retries = self.config.max_retries,
                        "processing attempt failed"
                    );
                    if attempt >= self.config.max_retries {
                        tracing::error!(key = %key, "retries exhausted");
                        self.quarantine(&entry).await;
                        break;
                    }
                    if !self.sleep_backoff(attempt, cancel).await {
                        break;
                    }
                }
            }
        }

        self.in_flight.remove(&key);
    }

    /// Returns false when cancellation interrupted the wait.
    async fn sleep_backoff(&self, attempt: u32, cancel: &CancellationToken) -> bool {
        let delay = retry_backoff(self.config.retry_base, attempt);
        tokio::select! {
            _ = tokio::time::sleep(delay) => true,
            _ = cancel.cancelled() => false,
        }
    }

    /// Restart recovery: rows left in `Processing` by a crashed worker are
    /// reconciled against the buckets. Delivery object present means the work
    /// finished (complete the bookkeeping); a raw object present means it did
    /// not (hand the key back to discovery via `Pending`).
    async fn recover(&self) {
        let keys = match self.catalog.list_by_status(VideoStatus::Processing).await {
            Ok(keys) => keys,
            Err(e) => {
                tracing::warn!(error = %e, "restart recovery skipped: catalog unavailable");
                return;
            }
        };

        for key in keys {
            match self.store.stat(&self.buckets.videos, &key).await {
                Ok(_) => {
                    if self.store.stat(&self.buckets.raw_videos, &key).await.is_ok() {
                        if let Err(e) = self.store.delete(&self.buckets.raw_videos, &key).await {
                            tracing::warn!(key = %key, error = %e, "failed to delete raw copy during recovery");
                        }
                    }
                    match self.catalog.update_status(&key, VideoStatus::Completed).await {
                        Ok(()) => tracing::info!(key = %key, "recovered as completed"),
                        Err(e) => tracing::warn!(key = %key, error = %e, "recovery status update failed"),
                    }
                }
                Err(StorageError::NotFound(_)) => {
                    match self.store.stat(&self.buckets.raw_videos, &key).await {
                        Ok(_) => {
                            match self.catalog.update_status(&key, VideoStatus::Pending).await {
                                Ok(()) => tracing::info!(key = %key, "re-queued for processing"),
                                Err(e) => tracing::warn!(key = %key, error = %e, "recovery status update failed"),
                            }
                        }
                        Err(StorageError::NotFound(_)) => {
                            tracing::warn!(key = %key, "stuck in processing but present in no bucket");
                        }
                        Err(e) => {
                            tracing::warn!(key = %key, error = %e, "recovery stat failed");
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(key = %key, error = %e, "recovery stat failed");
                }
            }
        }
    }
}
