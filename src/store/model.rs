use std::fmt::{Display, Formatter};

use chrono::{DateTime, Utc};
use rand::distributions::Alphanumeric;
use rand::{thread_rng, Rng};
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;

use crate::store::error::{invalid_argument, StoreResult};
use crate::store::value::{document_to_json, DocumentData, FieldValue};

const AUTO_ID_LENGTH: usize = 20;

/// Address of a document: a top-level collection plus a document id.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DocumentKey {
    collection: String,
    id: String,
}

impl DocumentKey {
    pub fn new(collection: &str, id: &str) -> StoreResult<Self> {
        validate_collection(collection)?;
        validate_document_id(id)?;
        Ok(Self {
            collection: collection.to_string(),
            id: id.to_string(),
        })
    }

    /// Parses `collection/id`.
    pub fn from_path(path: &str) -> StoreResult<Self> {
        match path.split_once('/') {
            Some((collection, id)) => Self::new(collection, id),
            None => Err(invalid_argument(format!(
                "Document path '{path}' must have the form collection/id"
            ))),
        }
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn path(&self) -> String {
        format!("{}/{}", self.collection, self.id)
    }
}

impl Display for DocumentKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.collection, self.id)
    }
}

pub fn validate_collection(collection: &str) -> StoreResult<()> {
    if collection.trim().is_empty() {
        return Err(invalid_argument("Collection name must not be empty"));
    }
    if collection.contains('/') {
        return Err(invalid_argument(format!(
            "Collection name '{collection}' must not contain '/'"
        )));
    }
    Ok(())
}

pub fn validate_document_id(id: &str) -> StoreResult<()> {
    if id.trim().is_empty() {
        return Err(invalid_argument("Document id must not be empty"));
    }
    if id.contains('/') {
        return Err(invalid_argument(format!(
            "Document id '{id}' must not contain '/'"
        )));
    }
    if id == "." || id == ".." || (id.starts_with("__") && id.ends_with("__")) {
        return Err(invalid_argument(format!("Document id '{id}' is reserved")));
    }
    Ok(())
}

pub(crate) fn generate_auto_id() -> String {
    thread_rng()
        .sample_iter(&Alphanumeric)
        .map(char::from)
        .take(AUTO_ID_LENGTH)
        .collect()
}

/// A document read back from the store.
#[derive(Clone, Debug, PartialEq)]
pub struct Document {
    key: DocumentKey,
    data: DocumentData,
    create_time: Option<DateTime<Utc>>,
    update_time: Option<DateTime<Utc>>,
}

impl Document {
    pub fn new(key: DocumentKey, data: DocumentData) -> Self {
        Self {
            key,
            data,
            create_time: None,
            update_time: None,
        }
    }

    pub fn with_times(
        mut self,
        create_time: Option<DateTime<Utc>>,
        update_time: Option<DateTime<Utc>>,
    ) -> Self {
        self.create_time = create_time;
        self.update_time = update_time;
        self
    }

    pub fn key(&self) -> &DocumentKey {
        &self.key
    }

    pub fn id(&self) -> &str {
        self.key.id()
    }

    pub fn collection(&self) -> &str {
        self.key.collection()
    }

    pub fn data(&self) -> &DocumentData {
        &self.data
    }

    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        crate::store::value::value_at_path(&self.data, field)
    }

    /// Backend-maintained creation time of the stored revision.
    pub fn create_time(&self) -> Option<DateTime<Utc>> {
        self.create_time
    }

    /// Backend-maintained time of the last write; used as a transaction precondition.
    pub fn update_time(&self) -> Option<DateTime<Utc>> {
        self.update_time
    }

    /// The document fields as JSON, with the document id under `id`.
    pub fn to_json(&self) -> JsonValue {
        let mut json = document_to_json(&self.data);
        if let JsonValue::Object(map) = &mut json {
            map.insert("id".to_string(), JsonValue::String(self.id().to_string()));
        }
        json
    }

    /// Deserialises the document (including its id) into a typed record.
    pub fn decode<T: DeserializeOwned>(&self) -> StoreResult<T> {
        serde_json::from_value(self.to_json()).map_err(|err| {
            invalid_argument(format!("Document {} does not match the expected shape: {err}", self.key))
        })
    }

    pub fn into_data(self) -> DocumentData {
        self.data
    }
}
