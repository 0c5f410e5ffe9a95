//! Document database facade.
//!
//! [`DocumentStore`] validates inputs, stamps `createdAt`/`updatedAt`, and
//! forwards to a [`Datastore`]: either the process-local
//! [`InMemoryDatastore`] or the REST-backed [`HttpDatastore`].
//!
//! ```
//! use estate_admin::store::{DocumentStore, QueryOptions, SetOptions};
//! use serde_json::json;
//!
//! # futures::executor::block_on(async {
//! let store = DocumentStore::in_memory();
//! store
//!     .set_document("users", "u1", &json!({"firstName": "Awa", "statut": 1}), SetOptions::default())
//!     .await?;
//! let page = store.query_collection("users", &QueryOptions::new().limit(5)).await?;
//! assert_eq!(page.documents.len(), 1);
//! # Ok::<(), estate_admin::store::StoreError>(())
//! # }).unwrap();
//! ```

mod batch;
mod client;
pub mod error;
mod listen;
mod model;
mod operations;
mod query;
pub mod remote;
mod transaction;
mod typed;
pub mod value;

pub use batch::{BatchOperation, WriteBatch, MAX_BATCH_WRITES};
pub use client::DocumentStore;
pub use error::{StoreError, StoreErrorCode, StoreResult};
pub use listen::{ListenerRegistration, SnapshotStream};
pub use model::{validate_collection, validate_document_id, Document, DocumentKey};
pub use operations::{SetOptions, CREATED_AT_FIELD, UPDATED_AT_FIELD};
pub use query::{
    Condition, Cursor, FieldFilter, FilterOperator, OrderBy, OrderDirection, QueryDefinition,
    QueryOptions, QueryPage, SortOrder, DEFAULT_PAGE_SIZE, DOCUMENT_ID_FIELD,
};
pub use remote::datastore::{
    Datastore, HttpDatastore, InMemoryDatastore, ListenTarget, SnapshotCallback, TransactionId,
    TransactionOptions, WriteOperation,
};
pub use transaction::Transaction;
pub use typed::{Collection, TypedPage};
pub(crate) use model::generate_auto_id;
pub(crate) use typed::entity_payload;
pub use value::{DocumentData, FieldValue, GeoPoint, ValueKind};
