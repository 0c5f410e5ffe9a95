use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value as JsonValue;

use crate::store::error::{backend_failure, invalid_argument, StoreResult};
use crate::store::model::DocumentKey;
use crate::store::operations::{parse_payload, stamp_created, stamp_updated, SetOptions};
use crate::store::remote::datastore::{Datastore, WriteOperation};
use crate::store::value::json_type_name;

pub const MAX_BATCH_WRITES: usize = 500;

/// One write of a batch, as described by the admin screens.
#[derive(Clone, Debug, PartialEq)]
pub enum BatchOperation {
    Set {
        collection: String,
        id: String,
        data: JsonValue,
        merge: bool,
    },
    Update {
        collection: String,
        id: String,
        data: JsonValue,
    },
    Delete {
        collection: String,
        id: String,
    },
}

#[derive(Deserialize)]
struct RawOperation {
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    collection: String,
    #[serde(default)]
    id: String,
    #[serde(default)]
    data: Option<JsonValue>,
    #[serde(default)]
    merge: bool,
}

impl BatchOperation {
    pub fn set(collection: impl Into<String>, id: impl Into<String>, data: JsonValue) -> Self {
        Self::Set {
            collection: collection.into(),
            id: id.into(),
            data,
            merge: false,
        }
    }

    pub fn merge(collection: impl Into<String>, id: impl Into<String>, data: JsonValue) -> Self {
        Self::Set {
            collection: collection.into(),
            id: id.into(),
            data,
            merge: true,
        }
    }

    pub fn update(collection: impl Into<String>, id: impl Into<String>, data: JsonValue) -> Self {
        Self::Update {
            collection: collection.into(),
            id: id.into(),
            data,
        }
    }

    pub fn delete(collection: impl Into<String>, id: impl Into<String>) -> Self {
        Self::Delete {
            collection: collection.into(),
            id: id.into(),
        }
    }

    /// Parses the `{type, collection, id, data, merge}` form.
    pub fn from_json(value: &JsonValue) -> StoreResult<Self> {
        if !value.is_object() {
            return Err(invalid_argument(format!(
                "Batch operation must be an object, got {}",
                json_type_name(value)
            )));
        }
        let raw: RawOperation = serde_json::from_value(value.clone())
            .map_err(|err| invalid_argument(format!("Malformed batch operation: {err}")))?;
        let require_data = |kind: &str| {
            raw.data.clone().ok_or_else(|| {
                invalid_argument(format!("Batch '{kind}' operation requires data"))
            })
        };
        match raw.kind.as_deref() {
            Some("set") => Ok(Self::Set {
                data: require_data("set")?,
                collection: raw.collection,
                id: raw.id,
                merge: raw.merge,
            }),
            Some("update") => Ok(Self::Update {
                data: require_data("update")?,
                collection: raw.collection,
                id: raw.id,
            }),
            Some("delete") => Ok(Self::Delete {
                collection: raw.collection,
                id: raw.id,
            }),
            Some(other) => Err(invalid_argument(format!(
                "Unsupported batch operation type '{other}'"
            ))),
            None => Err(invalid_argument("Batch operation is missing its type")),
        }
    }

    pub fn collection(&self) -> &str {
        match self {
            Self::Set { collection, .. }
            | Self::Update { collection, .. }
            | Self::Delete { collection, .. } => collection,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Self::Set { id, .. } | Self::Update { id, .. } | Self::Delete { id, .. } => id,
        }
    }

    /// Validates the operation and converts it into a stamped write.
    pub(crate) fn to_write(&self) -> StoreResult<WriteOperation> {
        let key = DocumentKey::new(self.collection(), self.id())?;
        match self {
            Self::Set { data, merge, .. } => {
                let mut data = parse_payload(data)?;
                if *merge {
                    stamp_updated(&mut data);
                } else {
                    stamp_created(&mut data);
                }
                Ok(WriteOperation::Set {
                    key,
                    data,
                    merge: *merge,
                })
            }
            Self::Update { data, .. } => {
                let mut data = parse_payload(data)?;
                stamp_updated(&mut data);
                Ok(WriteOperation::Update { key, data })
            }
            Self::Delete { .. } => Ok(WriteOperation::Delete { key }),
        }
    }
}

/// Validates every operation before anything is committed.
pub(crate) fn prepare_writes(operations: &[BatchOperation]) -> StoreResult<Vec<WriteOperation>> {
    if operations.len() > MAX_BATCH_WRITES {
        return Err(invalid_argument(format!(
            "A batch cannot contain more than {MAX_BATCH_WRITES} operations, got {}",
            operations.len()
        )));
    }
    operations.iter().map(BatchOperation::to_write).collect()
}

/// Aggregates writes and commits them atomically.
#[derive(Clone)]
pub struct WriteBatch {
    datastore: Arc<dyn Datastore>,
    writes: Vec<WriteOperation>,
}

impl WriteBatch {
    pub(crate) fn new(datastore: Arc<dyn Datastore>) -> Self {
        Self {
            datastore,
            writes: Vec::new(),
        }
    }

    pub fn set(
        &mut self,
        collection: &str,
        id: &str,
        data: JsonValue,
        options: SetOptions,
    ) -> StoreResult<&mut Self> {
        let operation = BatchOperation::Set {
            collection: collection.to_string(),
            id: id.to_string(),
            data,
            merge: options.merge,
        };
        self.push(&operation)
    }

    pub fn update(&mut self, collection: &str, id: &str, data: JsonValue) -> StoreResult<&mut Self> {
        self.push(&BatchOperation::update(collection, id, data))
    }

    pub fn delete(&mut self, collection: &str, id: &str) -> StoreResult<&mut Self> {
        self.push(&BatchOperation::delete(collection, id))
    }

    pub fn len(&self) -> usize {
        self.writes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    pub async fn commit(self) -> StoreResult<()> {
        let count = self.writes.len();
        self.datastore
            .commit(self.writes)
            .await
            .map_err(|err| backend_failure(format!("Failed to commit batch of {count} writes"), err))
    }

    fn push(&mut self, operation: &BatchOperation) -> StoreResult<&mut Self> {
        if self.writes.len() >= MAX_BATCH_WRITES {
            return Err(invalid_argument(format!(
                "A batch cannot contain more than {MAX_BATCH_WRITES} operations"
            )));
        }
        self.writes.push(operation.to_write()?);
        Ok(self)
    }
}
