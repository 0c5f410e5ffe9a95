pub mod connection;
pub mod datastore;
pub mod rpc_error;
pub mod serializer;

pub use connection::{Connection, ConnectionBuilder, RequestContext};
pub use datastore::{
    Datastore, HttpDatastore, HttpDatastoreBuilder, InMemoryDatastore, ListenTarget,
    NoopTokenProvider, RetrySettings, SnapshotCallback, TokenProvider, TokenProviderArc,
    TransactionId, TransactionOptions, WriteOperation,
};
pub use serializer::JsonProtoSerializer;
