//! Catalog adapter: durable per-asset lifecycle state in Postgres.

pub mod catalog;
#[cfg(any(test, feature = "test-util"))]
pub mod memory;

pub use catalog::{connect_with_retry, CatalogError, CatalogResult, PgCatalog, VideoCatalog};
#[cfg(any(test, feature = "test-util"))]
pub use memory::MemoryCatalog;
