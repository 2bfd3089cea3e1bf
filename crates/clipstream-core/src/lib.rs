//! Core types shared by every clipstream crate: configuration and the
//! per-asset lifecycle state.

pub mod config;
pub mod status;

pub use config::{Buckets, Config, IngestSettings};
pub use status::VideoStatus;
