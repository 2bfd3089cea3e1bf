//! Ingest scheduler: discovers raw uploads, drives the transcoder through a
//! bounded worker pool, and promotes results into the delivery bucket while
//! advancing the catalog.

mod pipeline;
pub mod scheduler;

pub use scheduler::{IngestScheduler, SchedulerConfig};
