use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::store::error::{aborted, invalid_argument, not_found, StoreResult};
use crate::store::listen::ListenerRegistration;
use crate::store::model::{Document, DocumentKey};
use crate::store::operations::{merge_into, resolve_server_timestamps, set_value_at_path};
use crate::store::query::QueryDefinition;
use crate::store::value::DocumentData;

use super::{Datastore, ListenTarget, SnapshotCallback, TransactionId, WriteOperation};

#[derive(Clone, Debug)]
struct StoredDocument {
    data: DocumentData,
    create_time: DateTime<Utc>,
    update_time: DateTime<Utc>,
    version: u64,
}

impl StoredDocument {
    fn to_document(&self, key: &DocumentKey) -> Document {
        Document::new(key.clone(), self.data.clone())
            .with_times(Some(self.create_time), Some(self.update_time))
    }
}

struct ListenerEntry {
    target: ListenTarget,
    delivery: Arc<SnapshotDelivery>,
    last: Vec<Document>,
}

/// Hands snapshots to one listener in commit order.
///
/// Each snapshot carries the store version it was evaluated at. Snapshots
/// older than the newest one seen are dropped. The thread that finds the
/// queue idle drains it, so the callback never runs twice at once and never
/// under a lock.
struct SnapshotDelivery {
    callback: SnapshotCallback,
    queue: Mutex<DeliveryQueue>,
}

#[derive(Default)]
struct DeliveryQueue {
    pending: Option<(u64, Vec<Document>)>,
    delivered: Option<u64>,
    draining: bool,
    detached: bool,
}

impl SnapshotDelivery {
    fn new(callback: SnapshotCallback) -> Arc<Self> {
        Arc::new(Self {
            callback,
            queue: Mutex::new(DeliveryQueue::default()),
        })
    }

    fn offer(&self, version: u64, documents: Vec<Document>) {
        {
            let mut queue = self.queue.lock().unwrap();
            let newest = queue
                .pending
                .as_ref()
                .map(|(pending, _)| *pending)
                .max(queue.delivered);
            if queue.detached || newest.is_some_and(|newest| version <= newest) {
                return;
            }
            queue.pending = Some((version, documents));
            if queue.draining {
                return;
            }
            queue.draining = true;
        }

        loop {
            let next = {
                let mut queue = self.queue.lock().unwrap();
                match queue.pending.take() {
                    Some((version, documents)) if !queue.detached => {
                        queue.delivered = Some(version);
                        Some(documents)
                    }
                    _ => {
                        queue.draining = false;
                        None
                    }
                }
            };
            match next {
                Some(documents) => (self.callback)(Ok(documents)),
                None => break,
            }
        }
    }

    fn detach(&self) {
        let mut queue = self.queue.lock().unwrap();
        queue.detached = true;
        queue.pending = None;
    }
}

type ReadSet = BTreeMap<DocumentKey, Option<u64>>;

#[derive(Default)]
struct State {
    documents: BTreeMap<DocumentKey, StoredDocument>,
    version: u64,
    transactions: HashMap<TransactionId, ReadSet>,
    next_transaction: u64,
    listeners: BTreeMap<u64, ListenerEntry>,
    next_listener: u64,
}

/// Process-local datastore with the same write, query, transaction and
/// listen semantics as the managed service.
///
/// Listeners are notified synchronously once a commit has been applied.
#[derive(Clone, Default)]
pub struct InMemoryDatastore {
    state: Arc<Mutex<State>>,
}

impl InMemoryDatastore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored documents across all collections.
    pub fn document_count(&self) -> usize {
        self.state.lock().unwrap().documents.len()
    }

    fn apply_commit(&self, writes: Vec<WriteOperation>, reads: Option<ReadSet>) -> StoreResult<()> {
        let notifications = {
            let mut state = self.state.lock().unwrap();
            if let Some(reads) = reads {
                for (key, version) in reads {
                    let current = state.documents.get(&key).map(|stored| stored.version);
                    if current != version {
                        return Err(aborted(format!(
                            "Document {key} changed since it was read in the transaction"
                        )));
                    }
                }
            }

            let version = state.version + 1;
            let now = Utc::now();
            let mut documents = state.documents.clone();
            for write in writes {
                apply_write(&mut documents, write, version, now)?;
            }
            state.documents = documents;
            state.version = version;
            collect_notifications(&mut state)
        };

        for (delivery, version, documents) in notifications {
            delivery.offer(version, documents);
        }
        Ok(())
    }
}

fn apply_write(
    documents: &mut BTreeMap<DocumentKey, StoredDocument>,
    write: WriteOperation,
    version: u64,
    now: DateTime<Utc>,
) -> StoreResult<()> {
    match write {
        WriteOperation::Set { key, data, merge } => {
            let existing = documents.get(&key);
            let create_time = existing.map(|stored| stored.create_time).unwrap_or(now);
            let mut fields = match (merge, existing) {
                (true, Some(stored)) => {
                    let mut fields = stored.data.clone();
                    merge_into(&mut fields, data);
                    fields
                }
                (true, None) => {
                    let mut fields = DocumentData::new();
                    merge_into(&mut fields, data);
                    fields
                }
                (false, _) => data,
            };
            resolve_server_timestamps(&mut fields, now);
            documents.insert(
                key,
                StoredDocument {
                    data: fields,
                    create_time,
                    update_time: now,
                    version,
                },
            );
        }
        WriteOperation::Update { key, data } => {
            let stored = documents
                .get_mut(&key)
                .ok_or_else(|| not_found(format!("No document to update: {key}")))?;
            for (path, value) in data {
                set_value_at_path(&mut stored.data, &path, value);
            }
            resolve_server_timestamps(&mut stored.data, now);
            stored.update_time = now;
            stored.version = version;
        }
        WriteOperation::Delete { key } => {
            documents.remove(&key);
        }
    }
    Ok(())
}

fn evaluate(documents: &BTreeMap<DocumentKey, StoredDocument>, target: &ListenTarget) -> Vec<Document> {
    match target {
        ListenTarget::Document(key) => documents
            .get(key)
            .map(|stored| vec![stored.to_document(key)])
            .unwrap_or_default(),
        ListenTarget::Query(query) => run_query_over(documents, query),
    }
}

fn run_query_over(
    documents: &BTreeMap<DocumentKey, StoredDocument>,
    query: &QueryDefinition,
) -> Vec<Document> {
    let candidates = documents
        .iter()
        .filter(|(key, _)| key.collection() == query.collection())
        .map(|(key, stored)| stored.to_document(key))
        .collect();
    query.apply(candidates)
}

fn collect_notifications(state: &mut State) -> Vec<(Arc<SnapshotDelivery>, u64, Vec<Document>)> {
    let State {
        documents,
        listeners,
        version,
        ..
    } = state;
    let mut notifications = Vec::new();
    for entry in listeners.values_mut() {
        let result = evaluate(documents, &entry.target);
        if result != entry.last {
            entry.last = result.clone();
            notifications.push((Arc::clone(&entry.delivery), *version, result));
        }
    }
    notifications
}

#[async_trait]
impl Datastore for InMemoryDatastore {
    async fn get_document(&self, key: &DocumentKey) -> StoreResult<Option<Document>> {
        let state = self.state.lock().unwrap();
        Ok(state.documents.get(key).map(|stored| stored.to_document(key)))
    }

    async fn run_query(&self, query: &QueryDefinition) -> StoreResult<Vec<Document>> {
        let state = self.state.lock().unwrap();
        Ok(run_query_over(&state.documents, query))
    }

    async fn commit(&self, writes: Vec<WriteOperation>) -> StoreResult<()> {
        if writes.is_empty() {
            return Ok(());
        }
        self.apply_commit(writes, None)
    }

    async fn begin_transaction(&self) -> StoreResult<TransactionId> {
        let mut state = self.state.lock().unwrap();
        state.next_transaction += 1;
        let id = TransactionId::new(format!("txn-{}", state.next_transaction));
        state.transactions.insert(id.clone(), ReadSet::new());
        Ok(id)
    }

    async fn get_in_transaction(
        &self,
        transaction: &TransactionId,
        key: &DocumentKey,
    ) -> StoreResult<Option<Document>> {
        let mut state = self.state.lock().unwrap();
        let stored = state.documents.get(key).cloned();
        let reads = state.transactions.get_mut(transaction).ok_or_else(|| {
            invalid_argument(format!("Unknown transaction '{}'", transaction.as_str()))
        })?;
        reads
            .entry(key.clone())
            .or_insert_with(|| stored.as_ref().map(|stored| stored.version));
        Ok(stored.map(|stored| stored.to_document(key)))
    }

    async fn commit_transaction(
        &self,
        transaction: &TransactionId,
        writes: Vec<WriteOperation>,
    ) -> StoreResult<()> {
        let reads = self
            .state
            .lock()
            .unwrap()
            .transactions
            .remove(transaction)
            .ok_or_else(|| {
                invalid_argument(format!("Unknown transaction '{}'", transaction.as_str()))
            })?;
        self.apply_commit(writes, Some(reads))
    }

    async fn rollback(&self, transaction: &TransactionId) -> StoreResult<()> {
        self.state.lock().unwrap().transactions.remove(transaction);
        Ok(())
    }

    fn listen(
        &self,
        target: ListenTarget,
        callback: SnapshotCallback,
    ) -> StoreResult<ListenerRegistration> {
        let delivery = SnapshotDelivery::new(callback);
        let (id, version, initial) = {
            let mut state = self.state.lock().unwrap();
            let initial = evaluate(&state.documents, &target);
            state.next_listener += 1;
            let id = state.next_listener;
            state.listeners.insert(
                id,
                ListenerEntry {
                    target,
                    delivery: Arc::clone(&delivery),
                    last: initial.clone(),
                },
            );
            (id, state.version, initial)
        };
        log::debug!("registered in-memory listener {id}");

        delivery.offer(version, initial);

        let state = Arc::clone(&self.state);
        Ok(ListenerRegistration::new(move || {
            state.lock().unwrap().listeners.remove(&id);
            delivery.detach();
            log::debug!("removed in-memory listener {id}");
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::query::{FilterOperator, QueryOptions};
    use crate::store::value::{document_from_json, FieldValue};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn key(path: &str) -> DocumentKey {
        DocumentKey::from_path(path).unwrap()
    }

    fn data(value: serde_json::Value) -> DocumentData {
        document_from_json(&value).unwrap()
    }

    #[tokio::test]
    async fn commit_is_all_or_nothing() {
        let datastore = InMemoryDatastore::new();
        let result = datastore
            .commit(vec![
                WriteOperation::Set {
                    key: key("users/u1"),
                    data: data(json!({"firstName": "Awa"})),
                    merge: false,
                },
                WriteOperation::Update {
                    key: key("users/missing"),
                    data: data(json!({"statut": 1})),
                },
            ])
            .await;
        assert_eq!(result.unwrap_err().code_str(), "store/not-found");
        assert_eq!(datastore.document_count(), 0);
    }

    #[tokio::test]
    async fn server_timestamps_resolve_on_commit() {
        let datastore = InMemoryDatastore::new();
        let mut fields = data(json!({"title": "Villa"}));
        fields.insert("createdAt".into(), FieldValue::server_timestamp());
        datastore
            .commit(vec![WriteOperation::Set {
                key: key("properties/p1"),
                data: fields,
                merge: false,
            }])
            .await
            .unwrap();
        let document = datastore.get_document(&key("properties/p1")).await.unwrap().unwrap();
        assert_eq!(
            document.get("createdAt").and_then(FieldValue::as_timestamp),
            document.update_time()
        );
    }

    #[tokio::test]
    async fn transaction_conflict_aborts() {
        let datastore = InMemoryDatastore::new();
        datastore
            .commit(vec![WriteOperation::Set {
                key: key("users/u1"),
                data: data(json!({"statut": 0})),
                merge: false,
            }])
            .await
            .unwrap();

        let transaction = datastore.begin_transaction().await.unwrap();
        datastore.get_in_transaction(&transaction, &key("users/u1")).await.unwrap();
        datastore
            .commit(vec![WriteOperation::Update {
                key: key("users/u1"),
                data: data(json!({"statut": 2})),
            }])
            .await
            .unwrap();

        let err = datastore
            .commit_transaction(
                &transaction,
                vec![WriteOperation::Update {
                    key: key("users/u1"),
                    data: data(json!({"statut": 1})),
                }],
            )
            .await
            .unwrap_err();
        assert_eq!(err.code_str(), "store/aborted");
    }

    #[tokio::test]
    async fn listeners_fire_only_when_their_result_changes() {
        let datastore = InMemoryDatastore::new();
        let query = QueryOptions::new()
            .where_field("statut", FilterOperator::Equal, 1)
            .build("users")
            .unwrap();
        let deliveries = Arc::new(AtomicUsize::new(0));
        let registration = datastore
            .listen(ListenTarget::Query(query), {
                let deliveries = deliveries.clone();
                Arc::new(move |result: StoreResult<Vec<Document>>| {
                    assert!(result.is_ok());
                    deliveries.fetch_add(1, Ordering::SeqCst);
                })
            })
            .unwrap();
        assert_eq!(deliveries.load(Ordering::SeqCst), 1);

        datastore
            .commit(vec![WriteOperation::Set {
                key: key("users/u1"),
                data: data(json!({"statut": 0})),
                merge: false,
            }])
            .await
            .unwrap();
        assert_eq!(deliveries.load(Ordering::SeqCst), 1);

        datastore
            .commit(vec![WriteOperation::Set {
                key: key("users/u2"),
                data: data(json!({"statut": 1})),
                merge: false,
            }])
            .await
            .unwrap();
        assert_eq!(deliveries.load(Ordering::SeqCst), 2);

        registration.detach();
        datastore
            .commit(vec![WriteOperation::Delete { key: key("users/u2") }])
            .await
            .unwrap();
        assert_eq!(deliveries.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_commits_end_on_the_current_snapshot() {
        for round in 0..20 {
            let datastore = InMemoryDatastore::new();
            let query = QueryDefinition::collection_scan("users").unwrap();
            let sizes = Arc::new(Mutex::new(Vec::new()));
            let registration = datastore
                .listen(ListenTarget::Query(query), {
                    let sizes = sizes.clone();
                    Arc::new(move |result: StoreResult<Vec<Document>>| {
                        sizes.lock().unwrap().push(result.unwrap().len());
                    })
                })
                .unwrap();

            let writers: Vec<_> = (0..4)
                .map(|writer| {
                    let datastore = datastore.clone();
                    tokio::spawn(async move {
                        for n in 0..50 {
                            datastore
                                .commit(vec![WriteOperation::Set {
                                    key: key(&format!("users/w{writer}-{n}")),
                                    data: data(json!({"statut": 1})),
                                    merge: false,
                                }])
                                .await
                                .unwrap();
                            tokio::task::yield_now().await;
                        }
                    })
                })
                .collect();
            for writer in writers {
                writer.await.unwrap();
            }

            let sizes = sizes.lock().unwrap();
            assert_eq!(sizes.last(), Some(&200), "round {round}");
            assert!(sizes.windows(2).all(|pair| pair[0] < pair[1]), "round {round}");
            registration.detach();
        }
    }
}
