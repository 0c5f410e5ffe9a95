use std::sync::Arc;

use bytes::Bytes;

use crate::storage::backend::{InMemoryObjectStore, ObjectStore};
use crate::storage::error::{backend_failure, StorageError, StorageResult};
use crate::storage::location::{content_type_for, validate_path};
use crate::storage::upload::{ProgressFn, UploadHandle, UploadProgress, Uploader};

/// File storage facade.
///
/// Paths are validated before the backend is reached. Backend failures come
/// back with code `storage/backend`.
#[derive(Clone)]
pub struct Storage {
    store: Arc<dyn ObjectStore>,
}

impl Storage {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryObjectStore::default()))
    }

    pub fn object_store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    /// Uploads `data` to `path` and returns its download URL.
    pub async fn upload_file(&self, path: &str, data: impl Into<Bytes>) -> StorageResult<String> {
        self.prepare(path, data.into(), None)?.await
    }

    /// Starts a chunked upload reporting progress after every chunk.
    ///
    /// The returned handle exposes the [`UploadTask`](crate::storage::UploadTask)
    /// immediately; the upload itself runs when the handle is awaited.
    pub fn upload_file_with_progress<F>(
        &self,
        path: &str,
        data: impl Into<Bytes>,
        on_progress: F,
    ) -> StorageResult<UploadHandle>
    where
        F: Fn(UploadProgress) + Send + Sync + 'static,
    {
        let on_progress: ProgressFn = Box::new(on_progress);
        self.prepare(path, data.into(), Some(on_progress))
    }

    pub async fn get_file_url(&self, path: &str) -> StorageResult<String> {
        validate_path(path)?;
        self.store
            .download_url(path)
            .await
            .map_err(|err| failure(format!("Failed to get download URL for {path}"), err))
    }

    pub async fn delete_file(&self, path: &str) -> StorageResult<()> {
        validate_path(path)?;
        self.store
            .delete(path)
            .await
            .map_err(|err| failure(format!("Failed to delete {path}"), err))
    }

    fn prepare(&self, path: &str, data: Bytes, on_progress: Option<ProgressFn>) -> StorageResult<UploadHandle> {
        validate_path(path)?;
        let uploader = Uploader {
            store: Arc::clone(&self.store),
            path: path.to_string(),
            data,
            content_type: content_type_for(path),
            on_progress,
        };
        let handle = uploader.into_handle();
        let path = path.to_string();
        Ok(handle.map_err(move |err| failure(format!("Failed to upload {path}"), err)))
    }
}

fn failure(prefix: String, error: StorageError) -> StorageError {
    let error = backend_failure(prefix, error);
    log::warn!("{error}");
    error
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::error::StorageErrorCode;
    use crate::storage::upload::{UploadTaskState, RESUMABLE_UPLOAD_CHUNK_SIZE};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn upload_get_url_and_delete() {
        let storage = Storage::in_memory();
        let url = storage
            .upload_file("avatars/u1.png", b"png".to_vec())
            .await
            .expect("upload");
        assert!(url.contains("avatars%2Fu1%2Epng"));
        assert!(url.contains("token="));

        let again = storage.get_file_url("avatars/u1.png").await.expect("url");
        assert_eq!(again, url);

        storage.delete_file("avatars/u1.png").await.expect("delete");
        let err = storage.get_file_url("avatars/u1.png").await.unwrap_err();
        assert_eq!(err.code, StorageErrorCode::Backend);
        assert!(err.message().starts_with("Failed to get download URL for avatars/u1.png: "));
    }

    #[tokio::test]
    async fn invalid_paths_fail_before_the_backend() {
        let storage = Storage::in_memory();
        for path in ["", "  ", "/leading", "trailing/", "a//b"] {
            let err = storage.upload_file(path, Bytes::from_static(b"x")).await.unwrap_err();
            assert_eq!(err.code, StorageErrorCode::InvalidArgument, "path {path:?}");
        }
        assert!(storage.upload_file_with_progress("", Bytes::new(), |_| {}).is_err());
    }

    #[tokio::test]
    async fn progress_handle_reports_every_chunk() {
        let storage = Storage::in_memory();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let handle = storage
            .upload_file_with_progress(
                "contracts/c1.pdf",
                vec![1u8; 2 * RESUMABLE_UPLOAD_CHUNK_SIZE],
                move |_| {
                    counter.fetch_add(1, Ordering::SeqCst);
                },
            )
            .expect("handle");
        let task = handle.task().clone();
        handle.await.expect("upload");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(task.state(), UploadTaskState::Completed);
    }
}
