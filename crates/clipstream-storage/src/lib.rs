//! Object-store adapter: a small capability set over named buckets with a
//! remote S3/MinIO implementation and an in-memory backend for tests.

#[cfg(any(test, feature = "test-util"))]
pub mod memory;
pub mod s3;
pub mod traits;

#[cfg(any(test, feature = "test-util"))]
pub use memory::MemoryObjectStore;
pub use s3::S3ObjectStore;
pub use traits::{
    ObjectBody, ObjectEntry, ObjectInfo, ObjectStore, ObjectStream, StorageError, StorageResult,
};
