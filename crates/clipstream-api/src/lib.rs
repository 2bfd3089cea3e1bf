//! HTTP surface of the content-delivery node: range streaming, lifecycle
//! metadata, static assets, and bootstrap wiring.

pub mod error;
pub mod handlers;
pub mod setup;
pub mod state;
pub mod telemetry;
