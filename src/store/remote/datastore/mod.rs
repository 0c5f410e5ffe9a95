use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::store::error::{StoreErrorCode, StoreResult};
use crate::store::listen::ListenerRegistration;
use crate::store::model::{Document, DocumentKey};
use crate::store::query::QueryDefinition;
use crate::store::transaction::Transaction;
use crate::store::value::DocumentData;
use crate::util::backoff::BackoffConfig;
use crate::util::runtime::sleep;

pub mod http;
pub mod in_memory;

#[derive(Clone, Debug, PartialEq)]
pub enum WriteOperation {
    /// Replaces the document, or deep-merges into it when `merge` is set.
    Set {
        key: DocumentKey,
        data: DocumentData,
        merge: bool,
    },
    /// Patches an existing document. Keys may be dotted field paths.
    Update { key: DocumentKey, data: DocumentData },
    Delete { key: DocumentKey },
}

impl WriteOperation {
    pub fn key(&self) -> &DocumentKey {
        match self {
            WriteOperation::Set { key, .. }
            | WriteOperation::Update { key, .. }
            | WriteOperation::Delete { key } => key,
        }
    }
}

/// What a listener watches.
#[derive(Clone, Debug, PartialEq)]
pub enum ListenTarget {
    Query(QueryDefinition),
    Document(DocumentKey),
}

/// Receives the full result of a listen target each time it changes. Document
/// targets deliver zero or one document.
pub type SnapshotCallback = Arc<dyn Fn(StoreResult<Vec<Document>>) + Send + Sync + 'static>;

/// Opaque handle of a server-side transaction.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TransactionId(String);

impl TransactionId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[async_trait]
pub trait Datastore: Send + Sync + 'static {
    async fn get_document(&self, key: &DocumentKey) -> StoreResult<Option<Document>>;
    async fn run_query(&self, query: &QueryDefinition) -> StoreResult<Vec<Document>>;
    /// Applies every write atomically: all of them or none.
    async fn commit(&self, writes: Vec<WriteOperation>) -> StoreResult<()>;

    async fn begin_transaction(&self) -> StoreResult<TransactionId>;
    async fn get_in_transaction(
        &self,
        transaction: &TransactionId,
        key: &DocumentKey,
    ) -> StoreResult<Option<Document>>;
    /// Commits `writes`; fails with `aborted` when a document read through the
    /// transaction changed in the meantime.
    async fn commit_transaction(
        &self,
        transaction: &TransactionId,
        writes: Vec<WriteOperation>,
    ) -> StoreResult<()>;
    async fn rollback(&self, transaction: &TransactionId) -> StoreResult<()>;

    /// Registers `callback`, delivers the current result once, then again on
    /// every change until the registration is detached.
    fn listen(
        &self,
        target: ListenTarget,
        callback: SnapshotCallback,
    ) -> StoreResult<ListenerRegistration>;
}

#[async_trait]
pub trait TokenProvider: Send + Sync + 'static {
    async fn get_token(&self) -> StoreResult<Option<String>>;
    fn invalidate_token(&self);
}

#[derive(Default, Clone)]
pub struct NoopTokenProvider;

#[async_trait]
impl TokenProvider for NoopTokenProvider {
    async fn get_token(&self) -> StoreResult<Option<String>> {
        Ok(None)
    }

    fn invalidate_token(&self) {}
}

pub type TokenProviderArc = Arc<dyn TokenProvider>;

/// Retry policy of `run_transaction`.
#[derive(Clone, Debug)]
pub struct TransactionOptions {
    pub max_attempts: usize,
    pub backoff: BackoffConfig,
}

impl Default for TransactionOptions {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            backoff: BackoffConfig::default(),
        }
    }
}

impl TransactionOptions {
    fn delay(&self, attempt: usize) -> Duration {
        self.backoff.delay(attempt as u32)
    }
}

/// Runs `update_fn` inside a transaction, retrying on contention.
///
/// Each attempt starts a fresh transaction. Errors returned by `update_fn`
/// roll the transaction back and are returned unchanged; only an `aborted`
/// commit is retried.
pub async fn run_transaction<T, F, Fut>(
    datastore: &Arc<dyn Datastore>,
    options: &TransactionOptions,
    mut update_fn: F,
) -> StoreResult<T>
where
    F: FnMut(Arc<Transaction>) -> Fut,
    Fut: Future<Output = StoreResult<T>>,
{
    let mut attempt = 0usize;
    loop {
        let id = datastore.begin_transaction().await?;
        let transaction = Arc::new(Transaction::new(Arc::clone(datastore), id.clone()));
        let value = match update_fn(Arc::clone(&transaction)).await {
            Ok(value) => value,
            Err(err) => {
                if let Err(rollback_err) = datastore.rollback(&id).await {
                    log::debug!("transaction rollback failed: {rollback_err}");
                }
                return Err(err);
            }
        };

        match datastore
            .commit_transaction(&id, transaction.take_writes())
            .await
        {
            Ok(()) => return Ok(value),
            Err(err) if err.code == StoreErrorCode::Aborted && attempt + 1 < options.max_attempts => {
                let delay = options.delay(attempt);
                log::debug!(
                    "transaction attempt {} aborted, retrying in {:?}: {err}",
                    attempt + 1,
                    delay
                );
                sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

pub use http::{HttpDatastore, HttpDatastoreBuilder, RetrySettings};
pub use in_memory::InMemoryDatastore;
