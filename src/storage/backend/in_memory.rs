use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use rand::distributions::Alphanumeric;
use rand::Rng;

use crate::storage::error::{internal_error, invalid_argument, object_not_found, StorageResult};
use crate::storage::location::Location;
use crate::storage::metadata::ObjectMetadata;

use super::{download_url_for, ChunkStatus, ObjectStore, DEFAULT_STORAGE_ORIGIN};

struct StoredObject {
    data: Bytes,
    metadata: ObjectMetadata,
}

struct PendingUpload {
    path: String,
    total_bytes: u64,
    content_type: String,
    buffer: Vec<u8>,
}

#[derive(Default)]
struct State {
    objects: BTreeMap<String, StoredObject>,
    sessions: HashMap<String, PendingUpload>,
}

/// Process-local object store. Download URLs have the same shape as the
/// managed service's but are not served by anything.
#[derive(Clone)]
pub struct InMemoryObjectStore {
    bucket: String,
    state: Arc<Mutex<State>>,
}

impl InMemoryObjectStore {
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            state: Arc::new(Mutex::new(State::default())),
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn object(&self, path: &str) -> Option<Bytes> {
        let state = self.state.lock().unwrap();
        state.objects.get(path).map(|object| object.data.clone())
    }

    pub fn object_count(&self) -> usize {
        self.state.lock().unwrap().objects.len()
    }

    /// Resumable sessions opened but not finalized.
    pub fn pending_uploads(&self) -> usize {
        self.state.lock().unwrap().sessions.len()
    }

    fn store(&self, state: &mut State, path: &str, data: Bytes, content_type: &str) -> ObjectMetadata {
        let metadata = ObjectMetadata {
            bucket: Some(self.bucket.clone()),
            name: Some(path.to_string()),
            size: Some(data.len().to_string()),
            content_type: Some(content_type.to_string()),
            time_created: Some(Utc::now().to_rfc3339()),
            download_tokens: Some(random_token()),
        };
        state.objects.insert(
            path.to_string(),
            StoredObject {
                data,
                metadata: metadata.clone(),
            },
        );
        metadata
    }
}

impl Default for InMemoryObjectStore {
    fn default() -> Self {
        Self::new("estate-admin.appspot.com")
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn upload(&self, path: &str, data: Bytes, content_type: &str) -> StorageResult<ObjectMetadata> {
        let mut state = self.state.lock().unwrap();
        Ok(self.store(&mut state, path, data, content_type))
    }

    async fn start_resumable_upload(
        &self,
        path: &str,
        total_bytes: u64,
        content_type: &str,
    ) -> StorageResult<String> {
        let session = format!("session-{}", random_token());
        let mut state = self.state.lock().unwrap();
        state.sessions.insert(
            session.clone(),
            PendingUpload {
                path: path.to_string(),
                total_bytes,
                content_type: content_type.to_string(),
                buffer: Vec::with_capacity(total_bytes as usize),
            },
        );
        Ok(session)
    }

    async fn upload_chunk(
        &self,
        session: &str,
        offset: u64,
        chunk: Bytes,
        finalize: bool,
    ) -> StorageResult<ChunkStatus> {
        let mut state = self.state.lock().unwrap();
        let pending = state
            .sessions
            .get_mut(session)
            .ok_or_else(|| invalid_argument(format!("Unknown upload session {session}")))?;
        if offset != pending.buffer.len() as u64 {
            return Err(internal_error(format!(
                "Chunk offset {offset} does not match {} received bytes",
                pending.buffer.len()
            )));
        }
        pending.buffer.extend_from_slice(&chunk);
        let received = pending.buffer.len() as u64;
        if received > pending.total_bytes {
            return Err(internal_error("Upload exceeds its declared size"));
        }
        if !finalize {
            return Ok(ChunkStatus {
                bytes_received: received,
                metadata: None,
            });
        }

        let Some(pending) = state.sessions.remove(session) else {
            return Err(internal_error("Upload session vanished"));
        };
        if received != pending.total_bytes {
            return Err(internal_error(format!(
                "Finalized upload has {received} of {} bytes",
                pending.total_bytes
            )));
        }
        let metadata = self.store(
            &mut state,
            &pending.path,
            Bytes::from(pending.buffer),
            &pending.content_type,
        );
        Ok(ChunkStatus {
            bytes_received: received,
            metadata: Some(metadata),
        })
    }

    async fn download_url(&self, path: &str) -> StorageResult<String> {
        let state = self.state.lock().unwrap();
        let object = state.objects.get(path).ok_or_else(|| object_not_found(path))?;
        let token = object.metadata.first_download_token().unwrap_or_default();
        let location = Location::new(self.bucket.clone(), path)?;
        Ok(download_url_for(
            DEFAULT_STORAGE_ORIGIN,
            &location.full_server_url(),
            token,
        ))
    }

    async fn delete(&self, path: &str) -> StorageResult<()> {
        let mut state = self.state.lock().unwrap();
        state
            .objects
            .remove(path)
            .map(|_| ())
            .ok_or_else(|| object_not_found(path))
    }
}

fn random_token() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(32)
        .map(char::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::error::StorageErrorCode;

    #[tokio::test]
    async fn resumable_session_assembles_chunks() {
        let store = InMemoryObjectStore::new("bucket");
        let session = store
            .start_resumable_upload("docs/a.pdf", 6, "application/pdf")
            .await
            .unwrap();
        let first = store
            .upload_chunk(&session, 0, Bytes::from_static(b"abc"), false)
            .await
            .unwrap();
        assert_eq!(first.bytes_received, 3);
        assert!(first.metadata.is_none());
        let err = store
            .upload_chunk(&session, 1, Bytes::from_static(b"zz"), false)
            .await
            .unwrap_err();
        assert_eq!(err.code, StorageErrorCode::InternalError);
        let last = store
            .upload_chunk(&session, 3, Bytes::from_static(b"def"), true)
            .await
            .unwrap();
        assert_eq!(last.metadata.and_then(|m| m.size_bytes()), Some(6));
        assert_eq!(store.object("docs/a.pdf"), Some(Bytes::from_static(b"abcdef")));
        assert_eq!(store.pending_uploads(), 0);
    }

    #[tokio::test]
    async fn download_url_carries_token() {
        let store = InMemoryObjectStore::new("bucket");
        store
            .upload("avatars/u1.png", Bytes::from_static(b"png"), "image/png")
            .await
            .unwrap();
        let url = store.download_url("avatars/u1.png").await.unwrap();
        assert!(url.starts_with("https://firebasestorage.googleapis.com/v0/b/bucket/o/avatars%2Fu1%2Epng?alt=media&token="));
        store.delete("avatars/u1.png").await.unwrap();
        let err = store.download_url("avatars/u1.png").await.unwrap_err();
        assert_eq!(err.code, StorageErrorCode::ObjectNotFound);
    }
}
