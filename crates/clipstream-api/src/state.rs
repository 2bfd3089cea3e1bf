//! Shared application state handed to every handler.

use std::sync::Arc;

use clipstream_core::Buckets;
use clipstream_db::VideoCatalog;
use clipstream_storage::ObjectStore;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn ObjectStore>,
    pub catalog: Arc<dyn VideoCatalog>,
    pub buckets: Buckets,
}
