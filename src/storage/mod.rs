//! File storage facade over a binary object store.
//!
//! [`Storage`] validates object paths and delegates to an [`ObjectStore`]:
//! the process-local [`InMemoryObjectStore`] or the Cloud Storage for
//! Firebase REST client [`HttpObjectStore`]. Large payloads are sent through
//! resumable sessions so progress can be observed per chunk.

mod api;
mod backend;
pub mod error;
mod location;
mod metadata;
mod upload;

pub use api::Storage;
pub use backend::{ChunkStatus, HttpObjectStore, InMemoryObjectStore, ObjectStore, DEFAULT_STORAGE_ORIGIN};
pub use error::{StorageError, StorageErrorCode, StorageResult};
pub use location::{content_type_for, validate_path, Location};
pub use metadata::ObjectMetadata;
pub use upload::{
    UploadHandle, UploadProgress, UploadTask, UploadTaskState, MAX_RESUMABLE_CHUNK_SIZE,
    RESUMABLE_UPLOAD_CHUNK_SIZE,
};
