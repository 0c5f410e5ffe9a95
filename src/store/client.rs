use std::future::Future;
use std::sync::Arc;

use serde_json::Value as JsonValue;

use crate::domain::Entity;
use crate::store::batch::{prepare_writes, BatchOperation, WriteBatch};
use crate::store::error::{backend_failure, invalid_argument, StoreError, StoreResult};
use crate::store::listen::{ListenerRegistration, SnapshotStream};
use crate::store::model::{generate_auto_id, validate_collection, Document, DocumentKey};
use crate::store::operations::{
    parse_payload, stamp_created, stamp_updated, SetOptions, CREATED_AT_FIELD,
};
use crate::store::query::{QueryDefinition, QueryOptions, QueryPage};
use crate::store::remote::datastore::{
    run_transaction, Datastore, InMemoryDatastore, ListenTarget, SnapshotCallback,
    TransactionOptions, WriteOperation,
};
use crate::store::transaction::Transaction;
use crate::store::typed::Collection;
use crate::store::value::FieldValue;
use crate::util::PartialObserver;

/// Document database facade.
///
/// Inputs are validated before the backend is reached; backend failures come
/// back with code `store/backend` and a message naming the operation.
#[derive(Clone)]
pub struct DocumentStore {
    datastore: Arc<dyn Datastore>,
    transaction_options: TransactionOptions,
}

impl DocumentStore {
    pub fn new(datastore: Arc<dyn Datastore>) -> Self {
        Self {
            datastore,
            transaction_options: TransactionOptions::default(),
        }
    }

    /// A store backed by a fresh process-local datastore.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryDatastore::new()))
    }

    pub fn with_transaction_options(mut self, options: TransactionOptions) -> Self {
        self.transaction_options = options;
        self
    }

    pub fn datastore(&self) -> &Arc<dyn Datastore> {
        &self.datastore
    }

    /// Typed access to the collection of `T`.
    pub fn collection<T: Entity>(&self) -> Collection<T> {
        Collection::new(self.clone())
    }

    /// Creates a document with a generated id and returns that id.
    pub async fn add_document(&self, collection: &str, data: &JsonValue) -> StoreResult<String> {
        validate_collection(collection)?;
        let mut fields = parse_payload(data)?;
        stamp_created(&mut fields);
        let key = DocumentKey::new(collection, &generate_auto_id())?;
        let id = key.id().to_string();
        self.datastore
            .commit(vec![WriteOperation::Set {
                key,
                data: fields,
                merge: false,
            }])
            .await
            .map_err(|err| failure(format!("Failed to add document to {collection}"), err))?;
        Ok(id)
    }

    /// Writes a document under a caller-chosen id.
    ///
    /// Without `merge` the document is replaced and both timestamps are
    /// stamped. With `merge` the fields are deep-merged inside a transaction
    /// and `createdAt` is only added when the document did not exist.
    pub async fn set_document(
        &self,
        collection: &str,
        id: &str,
        data: &JsonValue,
        options: SetOptions,
    ) -> StoreResult<()> {
        let key = DocumentKey::new(collection, id)?;
        let mut fields = parse_payload(data)?;

        if !options.merge {
            stamp_created(&mut fields);
            return self
                .datastore
                .commit(vec![WriteOperation::Set {
                    key: key.clone(),
                    data: fields,
                    merge: false,
                }])
                .await
                .map_err(|err| failure(format!("Failed to set document {key}"), err));
        }

        stamp_updated(&mut fields);
        run_transaction(&self.datastore, &self.transaction_options, |transaction| {
            let key = key.clone();
            let mut fields = fields.clone();
            async move {
                if transaction.get_key(&key).await?.is_none() {
                    fields.insert(CREATED_AT_FIELD.to_string(), FieldValue::server_timestamp());
                }
                transaction.set_data(key, fields, true);
                Ok(())
            }
        })
        .await
        .map_err(|err| failure(format!("Failed to merge document {key}"), err))
    }

    /// Reads one document; a missing document is `None`.
    pub async fn get_document(&self, collection: &str, id: &str) -> StoreResult<Option<Document>> {
        let key = DocumentKey::new(collection, id)?;
        self.datastore
            .get_document(&key)
            .await
            .map_err(|err| failure(format!("Failed to get document {key}"), err))
    }

    /// Every document of `collection`, ordered by id.
    pub async fn get_all_documents(&self, collection: &str) -> StoreResult<Vec<Document>> {
        let query = QueryDefinition::collection_scan(collection)?;
        self.datastore
            .run_query(&query)
            .await
            .map_err(|err| failure(format!("Failed to list collection {collection}"), err))
    }

    /// Patches an existing document and refreshes `updatedAt`.
    pub async fn update_document(
        &self,
        collection: &str,
        id: &str,
        data: &JsonValue,
    ) -> StoreResult<()> {
        let key = DocumentKey::new(collection, id)?;
        let mut fields = parse_payload(data)?;
        stamp_updated(&mut fields);
        self.datastore
            .commit(vec![WriteOperation::Update {
                key: key.clone(),
                data: fields,
            }])
            .await
            .map_err(|err| failure(format!("Failed to update document {key}"), err))
    }

    /// Deletes a document. Deleting a missing document succeeds.
    pub async fn delete_document(&self, collection: &str, id: &str) -> StoreResult<()> {
        let key = DocumentKey::new(collection, id)?;
        self.datastore
            .commit(vec![WriteOperation::Delete { key: key.clone() }])
            .await
            .map_err(|err| failure(format!("Failed to delete document {key}"), err))
    }

    /// Runs one page of a filtered, sorted query.
    pub async fn query_collection(
        &self,
        collection: &str,
        options: &QueryOptions,
    ) -> StoreResult<QueryPage> {
        let query = options.build(collection)?;
        let documents = self
            .datastore
            .run_query(&query)
            .await
            .map_err(|err| failure(format!("Failed to query collection {collection}"), err))?;
        let cursor = query.next_cursor(&documents);
        Ok(QueryPage { documents, cursor })
    }

    /// Subscribes to the result of a query. `observer.next` receives the full
    /// result once now and again after every change.
    pub fn listen_to_collection(
        &self,
        collection: &str,
        options: &QueryOptions,
        observer: PartialObserver<Vec<Document>>,
    ) -> StoreResult<ListenerRegistration> {
        let query = listen_query(collection, options)?;
        let prefix = format!("Failed to listen to collection {collection}");
        let callback: SnapshotCallback =
            Arc::new(move |result: StoreResult<Vec<Document>>| match result {
                Ok(documents) => observer.notify_next(&documents),
                Err(err) => observer.notify_error(&failure(&prefix, err)),
            });
        self.register(ListenTarget::Query(query), callback)
    }

    /// Subscribes to one document; `None` is delivered while it does not exist.
    pub fn listen_to_document(
        &self,
        collection: &str,
        id: &str,
        observer: PartialObserver<Option<Document>>,
    ) -> StoreResult<ListenerRegistration> {
        let key = DocumentKey::new(collection, id)?;
        let prefix = format!("Failed to listen to document {key}");
        let callback: SnapshotCallback =
            Arc::new(move |result: StoreResult<Vec<Document>>| match result {
                Ok(documents) => observer.notify_next(&documents.into_iter().next()),
                Err(err) => observer.notify_error(&failure(&prefix, err)),
            });
        self.register(ListenTarget::Document(key), callback)
    }

    /// Stream flavour of `listen_to_collection`.
    pub fn collection_stream(
        &self,
        collection: &str,
        options: &QueryOptions,
    ) -> StoreResult<SnapshotStream<Vec<Document>>> {
        let query = listen_query(collection, options)?;
        let prefix = format!("Failed to listen to collection {collection}");
        let (sender, receiver) = async_channel::unbounded();
        let callback: SnapshotCallback = Arc::new(move |result: StoreResult<Vec<Document>>| {
            let _ = sender.try_send(result.map_err(|err| failure(&prefix, err)));
        });
        let registration = self.register(ListenTarget::Query(query), callback)?;
        Ok(SnapshotStream::new(receiver, registration))
    }

    /// Stream flavour of `listen_to_document`.
    pub fn document_stream(
        &self,
        collection: &str,
        id: &str,
    ) -> StoreResult<SnapshotStream<Option<Document>>> {
        let key = DocumentKey::new(collection, id)?;
        let prefix = format!("Failed to listen to document {key}");
        let (sender, receiver) = async_channel::unbounded();
        let callback: SnapshotCallback = Arc::new(move |result: StoreResult<Vec<Document>>| {
            let _ = sender.try_send(
                result
                    .map(|documents| documents.into_iter().next())
                    .map_err(|err| failure(&prefix, err)),
            );
        });
        let registration = self.register(ListenTarget::Document(key), callback)?;
        Ok(SnapshotStream::new(receiver, registration))
    }

    /// A builder for an atomic set of writes.
    pub fn batch(&self) -> WriteBatch {
        WriteBatch::new(Arc::clone(&self.datastore))
    }

    /// Validates every operation, then commits them as one atomic unit.
    pub async fn run_batch(&self, operations: &[BatchOperation]) -> StoreResult<()> {
        let writes = prepare_writes(operations)?;
        let count = writes.len();
        self.datastore
            .commit(writes)
            .await
            .map_err(|err| failure(format!("Failed to commit batch of {count} writes"), err))
    }

    /// Runs `update_fn` in a transaction, retrying it when a concurrent write
    /// invalidates one of its reads.
    pub async fn run_transaction<T, F, Fut>(&self, update_fn: F) -> StoreResult<T>
    where
        F: FnMut(Arc<Transaction>) -> Fut,
        Fut: Future<Output = StoreResult<T>>,
    {
        run_transaction(&self.datastore, &self.transaction_options, update_fn)
            .await
            .map_err(|err| failure("Transaction failed", err))
    }

    fn register(
        &self,
        target: ListenTarget,
        callback: SnapshotCallback,
    ) -> StoreResult<ListenerRegistration> {
        self.datastore
            .listen(target, callback)
            .map_err(|err| failure("Failed to register listener", err))
    }
}

fn listen_query(collection: &str, options: &QueryOptions) -> StoreResult<QueryDefinition> {
    if options.start_after.is_some() {
        return Err(invalid_argument(
            "Listeners do not support start_after cursors",
        ));
    }
    options.build(collection)
}

fn failure(prefix: impl std::fmt::Display, err: StoreError) -> StoreError {
    let wrapped = backend_failure(prefix, err);
    log::warn!("{wrapped}");
    wrapped
}
