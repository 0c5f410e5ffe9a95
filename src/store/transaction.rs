use std::sync::{Arc, Mutex};

use serde_json::Value as JsonValue;

use crate::store::error::{invalid_argument, StoreResult};
use crate::store::model::{Document, DocumentKey};
use crate::store::operations::{parse_payload, SetOptions};
use crate::store::remote::datastore::{Datastore, TransactionId, WriteOperation};
use crate::store::value::DocumentData;

/// Handle passed to a transaction function.
///
/// Reads go through the backend transaction and are checked again at commit
/// time. Writes are buffered and sent together once the function succeeds.
pub struct Transaction {
    datastore: Arc<dyn Datastore>,
    id: TransactionId,
    writes: Mutex<Vec<WriteOperation>>,
}

impl Transaction {
    pub(crate) fn new(datastore: Arc<dyn Datastore>, id: TransactionId) -> Self {
        Self {
            datastore,
            id,
            writes: Mutex::new(Vec::new()),
        }
    }

    pub async fn get(&self, collection: &str, id: &str) -> StoreResult<Option<Document>> {
        let key = DocumentKey::new(collection, id)?;
        self.get_key(&key).await
    }

    pub(crate) async fn get_key(&self, key: &DocumentKey) -> StoreResult<Option<Document>> {
        if !self.writes.lock().unwrap().is_empty() {
            return Err(invalid_argument(
                "Transactions require all reads to be executed before all writes",
            ));
        }
        self.datastore.get_in_transaction(&self.id, key).await
    }

    pub fn set(
        &self,
        collection: &str,
        id: &str,
        data: &JsonValue,
        options: SetOptions,
    ) -> StoreResult<()> {
        let key = DocumentKey::new(collection, id)?;
        let data = parse_payload(data)?;
        self.set_data(key, data, options.merge);
        Ok(())
    }

    pub fn update(&self, collection: &str, id: &str, data: &JsonValue) -> StoreResult<()> {
        let key = DocumentKey::new(collection, id)?;
        let data = parse_payload(data)?;
        self.push(WriteOperation::Update { key, data });
        Ok(())
    }

    pub fn delete(&self, collection: &str, id: &str) -> StoreResult<()> {
        let key = DocumentKey::new(collection, id)?;
        self.push(WriteOperation::Delete { key });
        Ok(())
    }

    pub(crate) fn set_data(&self, key: DocumentKey, data: DocumentData, merge: bool) {
        self.push(WriteOperation::Set { key, data, merge });
    }

    fn push(&self, write: WriteOperation) {
        self.writes.lock().unwrap().push(write);
    }

    pub(crate) fn take_writes(&self) -> Vec<WriteOperation> {
        std::mem::take(&mut *self.writes.lock().unwrap())
    }
}
