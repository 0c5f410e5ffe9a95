use std::cmp;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::future::BoxFuture;

use crate::storage::backend::ObjectStore;
use crate::storage::error::{canceled, StorageError, StorageErrorCode, StorageResult};

/// First chunk size of a resumable upload; payloads up to this size go in a
/// single request.
pub const RESUMABLE_UPLOAD_CHUNK_SIZE: usize = 256 * 1024;
pub const MAX_RESUMABLE_CHUNK_SIZE: usize = 32 * 1024 * 1024;
const MAX_CHUNK_RETRIES: u32 = 2;

/// Represents the execution state of an [`UploadTask`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UploadTaskState {
    Pending,
    Running,
    Completed,
    Error,
    Canceled,
}

impl UploadTaskState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Error | Self::Canceled)
    }
}

/// Bytes acknowledged by the backend so far.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UploadProgress {
    pub bytes_transferred: u64,
    pub total_bytes: u64,
}

impl UploadProgress {
    pub fn new(bytes_transferred: u64, total_bytes: u64) -> Self {
        Self {
            bytes_transferred,
            total_bytes,
        }
    }

    pub fn fraction(&self) -> f64 {
        if self.total_bytes == 0 {
            1.0
        } else {
            self.bytes_transferred as f64 / self.total_bytes as f64
        }
    }
}

pub(crate) type ProgressFn = Box<dyn Fn(UploadProgress) + Send + Sync + 'static>;

struct TaskState {
    state: UploadTaskState,
    transferred: u64,
    error: Option<StorageError>,
}

struct TaskInner {
    total_bytes: u64,
    cancel_requested: AtomicBool,
    state: Mutex<TaskState>,
}

/// Shared view of a running upload.
///
/// Clones observe the same upload. Cancellation takes effect at the next
/// chunk boundary.
#[derive(Clone)]
pub struct UploadTask {
    inner: Arc<TaskInner>,
}

impl UploadTask {
    pub(crate) fn new(total_bytes: u64) -> Self {
        Self {
            inner: Arc::new(TaskInner {
                total_bytes,
                cancel_requested: AtomicBool::new(false),
                state: Mutex::new(TaskState {
                    state: UploadTaskState::Pending,
                    transferred: 0,
                    error: None,
                }),
            }),
        }
    }

    pub fn state(&self) -> UploadTaskState {
        self.inner.state.lock().unwrap().state
    }

    pub fn snapshot(&self) -> UploadProgress {
        let guard = self.inner.state.lock().unwrap();
        UploadProgress::new(guard.transferred, self.inner.total_bytes)
    }

    pub fn total_bytes(&self) -> u64 {
        self.inner.total_bytes
    }

    /// Last failure, once the task is in [`UploadTaskState::Error`].
    pub fn last_error(&self) -> Option<StorageError> {
        self.inner.state.lock().unwrap().error.clone()
    }

    /// Requests cancellation. Returns `false` when the task already finished.
    pub fn cancel(&self) -> bool {
        let mut guard = self.inner.state.lock().unwrap();
        if guard.state.is_terminal() {
            return false;
        }
        self.inner.cancel_requested.store(true, Ordering::SeqCst);
        if guard.state == UploadTaskState::Pending {
            guard.state = UploadTaskState::Canceled;
        }
        true
    }

    fn cancel_requested(&self) -> bool {
        self.inner.cancel_requested.load(Ordering::SeqCst)
    }

    fn begin(&self) -> StorageResult<()> {
        let mut guard = self.inner.state.lock().unwrap();
        if self.cancel_requested() {
            guard.state = UploadTaskState::Canceled;
            return Err(canceled());
        }
        guard.state = UploadTaskState::Running;
        Ok(())
    }

    fn advance(&self, transferred: u64) -> UploadProgress {
        let mut guard = self.inner.state.lock().unwrap();
        guard.transferred = transferred;
        UploadProgress::new(transferred, self.inner.total_bytes)
    }

    fn finish(&self, state: UploadTaskState, error: Option<StorageError>) {
        let mut guard = self.inner.state.lock().unwrap();
        guard.state = state;
        guard.error = error;
    }

    fn fail<T>(&self, error: StorageError) -> StorageResult<T> {
        if error.code == StorageErrorCode::Canceled {
            self.finish(UploadTaskState::Canceled, None);
        } else {
            self.finish(UploadTaskState::Error, Some(error.clone()));
        }
        Err(error)
    }
}

/// Upload in flight: a task handle plus a lazy future resolving to the
/// download URL. Nothing is sent until the handle is awaited.
pub struct UploadHandle {
    task: UploadTask,
    future: BoxFuture<'static, StorageResult<String>>,
}

impl UploadHandle {
    pub fn task(&self) -> &UploadTask {
        &self.task
    }

    pub(crate) fn map_err<F>(self, map: F) -> Self
    where
        F: FnOnce(StorageError) -> StorageError + Send + 'static,
    {
        let future = self.future;
        Self {
            task: self.task,
            future: Box::pin(async move { future.await.map_err(map) }),
        }
    }
}

impl Future for UploadHandle {
    type Output = StorageResult<String>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.future.as_mut().poll(cx)
    }
}

pub(crate) struct Uploader {
    pub store: Arc<dyn ObjectStore>,
    pub path: String,
    pub data: Bytes,
    pub content_type: &'static str,
    pub on_progress: Option<ProgressFn>,
}

impl Uploader {
    pub fn into_handle(self) -> UploadHandle {
        let task = UploadTask::new(self.data.len() as u64);
        let runner_task = task.clone();
        UploadHandle {
            task,
            future: Box::pin(async move { self.run(runner_task).await }),
        }
    }

    async fn run(self, task: UploadTask) -> StorageResult<String> {
        task.begin()?;
        let outcome = if self.data.len() <= RESUMABLE_UPLOAD_CHUNK_SIZE {
            self.store
                .upload(&self.path, self.data.clone(), self.content_type)
                .await
                .map(|_| self.report(&task, self.data.len() as u64))
        } else {
            self.run_resumable(&task).await
        };
        if let Err(error) = outcome {
            return task.fail(error);
        }

        match self.store.download_url(&self.path).await {
            Ok(url) => {
                task.finish(UploadTaskState::Completed, None);
                log::debug!("uploaded {} bytes to {}", task.total_bytes(), self.path);
                Ok(url)
            }
            Err(error) => task.fail(error),
        }
    }

    async fn run_resumable(&self, task: &UploadTask) -> StorageResult<()> {
        let total = self.data.len() as u64;
        let session = self
            .store
            .start_resumable_upload(&self.path, total, self.content_type)
            .await?;

        let mut offset = 0u64;
        let mut multiplier = 1usize;
        let mut failures = 0u32;
        loop {
            if task.cancel_requested() {
                log::debug!("upload of {} canceled at {offset}/{total} bytes", self.path);
                return Err(canceled());
            }
            let chunk_size = cmp::min(RESUMABLE_UPLOAD_CHUNK_SIZE * multiplier, MAX_RESUMABLE_CHUNK_SIZE);
            let end = cmp::min(total, offset + chunk_size as u64);
            let finalize = end == total;
            let chunk = self.data.slice(offset as usize..end as usize);

            match self.store.upload_chunk(&session, offset, chunk, finalize).await {
                Ok(status) => {
                    failures = 0;
                    offset = status.bytes_received;
                    self.report(task, offset);
                    if status.metadata.is_some() || (finalize && offset >= total) {
                        return Ok(());
                    }
                    if RESUMABLE_UPLOAD_CHUNK_SIZE * multiplier * 2 <= MAX_RESUMABLE_CHUNK_SIZE {
                        multiplier *= 2;
                    }
                }
                Err(error) if error.code == StorageErrorCode::Unknown && failures < MAX_CHUNK_RETRIES => {
                    failures += 1;
                    multiplier = 1;
                    log::debug!("chunk at offset {offset} of {} failed ({error}), retrying", self.path);
                }
                Err(error) => return Err(error),
            }
        }
    }

    fn report(&self, task: &UploadTask, transferred: u64) {
        let progress = task.advance(transferred);
        if let Some(callback) = &self.on_progress {
            callback(progress);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::backend::InMemoryObjectStore;
    use std::sync::Mutex as StdMutex;

    fn uploader(store: &InMemoryObjectStore, len: usize, on_progress: Option<ProgressFn>) -> Uploader {
        Uploader {
            store: Arc::new(store.clone()),
            path: "docs/contract.pdf".into(),
            data: Bytes::from(vec![7u8; len]),
            content_type: "application/pdf",
            on_progress,
        }
    }

    fn recorder() -> (Arc<StdMutex<Vec<u64>>>, ProgressFn) {
        let seen = Arc::new(StdMutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let callback: ProgressFn =
            Box::new(move |progress: UploadProgress| sink.lock().unwrap().push(progress.bytes_transferred));
        (seen, callback)
    }

    #[tokio::test]
    async fn small_payload_reports_once() {
        let store = InMemoryObjectStore::default();
        let (seen, callback) = recorder();
        let handle = uploader(&store, 1_000, Some(callback)).into_handle();
        let task = handle.task().clone();
        assert_eq!(task.state(), UploadTaskState::Pending);

        let url = handle.await.expect("upload");
        assert!(url.contains("docs%2Fcontract%2Epdf"));
        assert_eq!(*seen.lock().unwrap(), vec![1_000]);
        assert_eq!(task.state(), UploadTaskState::Completed);
        assert_eq!(task.snapshot(), UploadProgress::new(1_000, 1_000));
    }

    #[tokio::test]
    async fn large_payload_uses_doubling_chunks() {
        let store = InMemoryObjectStore::default();
        let (seen, callback) = recorder();
        let total = 3 * RESUMABLE_UPLOAD_CHUNK_SIZE + 10;
        uploader(&store, total, Some(callback)).into_handle().await.expect("upload");

        let kib = RESUMABLE_UPLOAD_CHUNK_SIZE as u64;
        assert_eq!(*seen.lock().unwrap(), vec![kib, 3 * kib, total as u64]);
        assert_eq!(store.object("docs/contract.pdf").map(|b| b.len()), Some(total));
        assert_eq!(store.pending_uploads(), 0);
    }

    #[tokio::test]
    async fn cancel_between_chunks_stops_the_upload() {
        let store = InMemoryObjectStore::default();
        let slot: Arc<StdMutex<Option<UploadTask>>> = Arc::new(StdMutex::new(None));
        let cancel_slot = Arc::clone(&slot);
        let callback: ProgressFn = Box::new(move |_| {
            if let Some(task) = cancel_slot.lock().unwrap().as_ref() {
                task.cancel();
            }
        });
        let handle = uploader(&store, 4 * RESUMABLE_UPLOAD_CHUNK_SIZE, Some(callback)).into_handle();
        let task = handle.task().clone();
        *slot.lock().unwrap() = Some(task.clone());

        let err = handle.await.unwrap_err();
        assert_eq!(err.code, StorageErrorCode::Canceled);
        assert_eq!(task.state(), UploadTaskState::Canceled);
        assert_eq!(task.snapshot().bytes_transferred, RESUMABLE_UPLOAD_CHUNK_SIZE as u64);
        assert!(store.object("docs/contract.pdf").is_none());
        assert!(!task.cancel());
    }

    #[tokio::test]
    async fn cancel_before_start_sends_nothing() {
        let store = InMemoryObjectStore::default();
        let handle = uploader(&store, 10, None).into_handle();
        assert!(handle.task().cancel());
        assert_eq!(handle.task().state(), UploadTaskState::Canceled);
        let err = handle.await.unwrap_err();
        assert_eq!(err.code, StorageErrorCode::Canceled);
        assert_eq!(store.object_count(), 0);
    }
}
