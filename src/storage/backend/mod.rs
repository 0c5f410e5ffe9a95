use async_trait::async_trait;
use bytes::Bytes;

use crate::storage::error::StorageResult;
use crate::storage::metadata::ObjectMetadata;

mod http;
mod in_memory;

pub use http::{HttpObjectStore, DEFAULT_STORAGE_ORIGIN};
pub use in_memory::InMemoryObjectStore;

/// Server view of a resumable upload after a chunk.
#[derive(Clone, Debug, PartialEq)]
pub struct ChunkStatus {
    pub bytes_received: u64,
    /// Set once the upload is finalized.
    pub metadata: Option<ObjectMetadata>,
}

/// Binary object storage operations used by [`crate::storage::Storage`].
///
/// Paths are already validated. Uploads either go in one request
/// ([`ObjectStore::upload`]) or through a resumable session fed chunk by
/// chunk.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn upload(&self, path: &str, data: Bytes, content_type: &str) -> StorageResult<ObjectMetadata>;

    /// Opens a resumable session and returns its handle (the session URL for
    /// the REST backend).
    async fn start_resumable_upload(
        &self,
        path: &str,
        total_bytes: u64,
        content_type: &str,
    ) -> StorageResult<String>;

    async fn upload_chunk(
        &self,
        session: &str,
        offset: u64,
        chunk: Bytes,
        finalize: bool,
    ) -> StorageResult<ChunkStatus>;

    async fn download_url(&self, path: &str) -> StorageResult<String>;

    async fn delete(&self, path: &str) -> StorageResult<()>;
}

pub(crate) fn download_url_for(origin: &str, server_path: &str, token: &str) -> String {
    let token: String = url::form_urlencoded::byte_serialize(token.as_bytes()).collect();
    format!("{}/v0{server_path}?alt=media&token={token}", origin.trim_end_matches('/'))
}
