use std::marker::PhantomData;

use serde_json::Value as JsonValue;

use crate::domain::Entity;
use crate::store::client::DocumentStore;
use crate::store::error::{invalid_argument, StoreResult};
use crate::store::listen::ListenerRegistration;
use crate::store::model::Document;
use crate::store::operations::SetOptions;
use crate::store::query::{Cursor, QueryOptions};
use crate::util::PartialObserver;

/// One page of typed query results.
#[derive(Clone, Debug)]
pub struct TypedPage<T> {
    pub items: Vec<T>,
    pub cursor: Option<Cursor>,
}

/// Typed view over the collection that stores `T`.
pub struct Collection<T> {
    store: DocumentStore,
    _entity: PhantomData<fn() -> T>,
}

impl<T> Clone for Collection<T> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            _entity: PhantomData,
        }
    }
}

impl<T: Entity> Collection<T> {
    pub(crate) fn new(store: DocumentStore) -> Self {
        Self {
            store,
            _entity: PhantomData,
        }
    }

    pub fn name(&self) -> &'static str {
        T::COLLECTION
    }

    pub async fn get(&self, id: &str) -> StoreResult<Option<T>> {
        self.store
            .get_document(T::COLLECTION, id)
            .await?
            .map(|document| document.decode())
            .transpose()
    }

    pub async fn list(&self) -> StoreResult<Vec<T>> {
        decode_all(&self.store.get_all_documents(T::COLLECTION).await?)
    }

    /// Writes `entity` under its own id, merging into any existing document.
    pub async fn save(&self, entity: &T) -> StoreResult<()> {
        let payload = entity_payload(entity)?;
        self.store
            .set_document(T::COLLECTION, entity.id(), &payload, SetOptions::merge())
            .await
    }

    pub async fn update(&self, id: &str, patch: &JsonValue) -> StoreResult<()> {
        self.store.update_document(T::COLLECTION, id, patch).await
    }

    pub async fn delete(&self, id: &str) -> StoreResult<()> {
        self.store.delete_document(T::COLLECTION, id).await
    }

    pub async fn query(&self, options: &QueryOptions) -> StoreResult<TypedPage<T>> {
        let page = self.store.query_collection(T::COLLECTION, options).await?;
        Ok(TypedPage {
            items: decode_all(&page.documents)?,
            cursor: page.cursor,
        })
    }

    /// Typed `listen_to_collection`. Documents that fail to decode are
    /// reported through `observer.error`.
    pub fn listen(
        &self,
        options: &QueryOptions,
        observer: PartialObserver<Vec<T>>,
    ) -> StoreResult<ListenerRegistration>
    where
        T: 'static,
    {
        let raw = PartialObserver::new().with_next({
            let observer = observer.clone();
            move |documents: &Vec<Document>| match decode_all::<T>(documents) {
                Ok(items) => observer.notify_next(&items),
                Err(err) => observer.notify_error(&err),
            }
        });
        let raw = match observer.error {
            Some(error) => raw.with_error(move |err| error(err)),
            None => raw,
        };
        self.store.listen_to_collection(T::COLLECTION, options, raw)
    }
}

fn decode_all<T: Entity>(documents: &[Document]) -> StoreResult<Vec<T>> {
    documents.iter().map(Document::decode).collect()
}

/// Serialises `entity` as a document payload; the id lives in the key.
pub(crate) fn entity_payload<T: Entity>(entity: &T) -> StoreResult<JsonValue> {
    let mut payload = serde_json::to_value(entity)
        .map_err(|err| invalid_argument(format!("Failed to serialise {}: {err}", T::COLLECTION)))?;
    if let JsonValue::Object(map) = &mut payload {
        map.remove("id");
    }
    Ok(payload)
}
