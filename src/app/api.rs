use std::sync::Arc;

use crate::admin::UserManager;
use crate::app::errors::AppResult;
use crate::app::options::AdminOptions;
use crate::auth::{Auth, AuthBackend, InMemoryAuthBackend, OAuthPopupHandler, RestAuthBackend};
use crate::domain::Locale;
use crate::storage::{HttpObjectStore, InMemoryObjectStore, ObjectStore, Storage};
use crate::store::remote::{ConnectionBuilder, Datastore, HttpDatastore, InMemoryDatastore};
use crate::store::DocumentStore;

/// Backend bundle created once at start-up and passed to the screens.
///
/// Clones share the same backends and signed-in session.
#[derive(Clone)]
pub struct AdminApp {
    options: AdminOptions,
    store: DocumentStore,
    auth: Auth,
    storage: Storage,
}

impl AdminApp {
    pub fn builder(options: AdminOptions) -> AdminAppBuilder {
        AdminAppBuilder {
            options,
            datastore: None,
            auth_backend: None,
            object_store: None,
            popup_handler: None,
        }
    }

    /// Every backend process-local. Used by tests, demos and local runs.
    pub fn in_memory() -> Self {
        let app = Self::from_parts(
            AdminOptions::default(),
            DocumentStore::in_memory(),
            Auth::in_memory(),
            Storage::in_memory(),
        );
        log::debug!("created in-memory admin app");
        app
    }

    /// Talks to the managed services (or their emulators) over HTTP.
    ///
    /// Requests to the document store and object storage carry the signed-in
    /// user's id token.
    pub fn connect(options: AdminOptions) -> AppResult<Self> {
        Self::connect_with_popup(options, None)
    }

    pub fn connect_with_popup(
        options: AdminOptions,
        popup_handler: Option<Arc<dyn OAuthPopupHandler>>,
    ) -> AppResult<Self> {
        let project_id = options.require_project_id()?.to_string();
        let api_key = options.require_api_key()?.to_string();
        let bucket = options.bucket()?;

        let mut auth_backend = RestAuthBackend::new(api_key);
        if let Some(host) = options.auth_emulator_host.as_deref() {
            auth_backend = auth_backend.with_emulator_host(host);
        }
        let mut auth = Auth::new(Arc::new(auth_backend));
        if let Some(handler) = popup_handler {
            auth = auth.with_popup_handler(handler)?;
        }

        let mut connection = ConnectionBuilder::new(project_id.clone());
        if let Some(host) = options.firestore_emulator_host.as_deref() {
            connection = connection.with_emulator_host(host);
        }
        let datastore = HttpDatastore::builder(project_id.clone())
            .with_connection_builder(connection)
            .with_auth_provider(Arc::new(auth.clone()))
            .with_retry_settings(options.retry.to_settings())
            .with_poll_interval(options.poll_interval())
            .build()?;

        let mut object_store = HttpObjectStore::new(bucket).with_auth_provider(Arc::new(auth.clone()));
        if let Some(host) = options.storage_emulator_host.as_deref() {
            object_store = object_store.with_emulator_host(host);
        }

        log::debug!("connected admin app to project {project_id}");
        Ok(Self::from_parts(
            options,
            DocumentStore::new(Arc::new(datastore)),
            auth,
            Storage::new(Arc::new(object_store)),
        ))
    }

    fn from_parts(options: AdminOptions, store: DocumentStore, auth: Auth, storage: Storage) -> Self {
        Self {
            options,
            store,
            auth,
            storage,
        }
    }

    pub fn options(&self) -> &AdminOptions {
        &self.options
    }

    pub fn store(&self) -> &DocumentStore {
        &self.store
    }

    pub fn auth(&self) -> &Auth {
        &self.auth
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    /// User management screen acting as the signed-in administrator.
    ///
    /// Activity is attributed to `"anonymous"` when nobody is signed in.
    pub fn user_manager(&self, locale: Locale) -> UserManager {
        let admin_id = self
            .auth
            .current_user()
            .map(|user| user.uid)
            .unwrap_or_else(|| "anonymous".to_string());
        UserManager::new(&self.store, admin_id, locale)
    }
}

/// Assembles an [`AdminApp`] from injected backends. Missing backends are
/// process-local.
pub struct AdminAppBuilder {
    options: AdminOptions,
    datastore: Option<Arc<dyn Datastore>>,
    auth_backend: Option<Arc<dyn AuthBackend>>,
    object_store: Option<Arc<dyn ObjectStore>>,
    popup_handler: Option<Arc<dyn OAuthPopupHandler>>,
}

impl AdminAppBuilder {
    pub fn with_datastore(mut self, datastore: Arc<dyn Datastore>) -> Self {
        self.datastore = Some(datastore);
        self
    }

    pub fn with_auth_backend(mut self, backend: Arc<dyn AuthBackend>) -> Self {
        self.auth_backend = Some(backend);
        self
    }

    pub fn with_object_store(mut self, store: Arc<dyn ObjectStore>) -> Self {
        self.object_store = Some(store);
        self
    }

    pub fn with_popup_handler(mut self, handler: Arc<dyn OAuthPopupHandler>) -> Self {
        self.popup_handler = Some(handler);
        self
    }

    pub fn build(self) -> AppResult<AdminApp> {
        let datastore: Arc<dyn Datastore> = match self.datastore {
            Some(datastore) => datastore,
            None => Arc::new(InMemoryDatastore::new()),
        };
        let auth_backend: Arc<dyn AuthBackend> = match self.auth_backend {
            Some(backend) => backend,
            None => Arc::new(InMemoryAuthBackend::new()),
        };
        let object_store: Arc<dyn ObjectStore> = match self.object_store {
            Some(store) => store,
            None => match self.options.bucket() {
                Ok(bucket) => Arc::new(InMemoryObjectStore::new(bucket)),
                Err(_) => Arc::new(InMemoryObjectStore::default()),
            },
        };

        let mut auth = Auth::new(auth_backend);
        if let Some(handler) = self.popup_handler {
            auth = auth.with_popup_handler(handler)?;
        }
        Ok(AdminApp::from_parts(
            self.options,
            DocumentStore::new(datastore),
            auth,
            Storage::new(object_store),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::errors::AppError;
    use serde_json::json;

    #[tokio::test]
    async fn in_memory_app_shares_backends_between_clones() {
        let app = AdminApp::in_memory();
        let copy = app.clone();
        app.store()
            .set_document("users", "u1", &json!({"firstName": "Awa"}), Default::default())
            .await
            .expect("set");
        let doc = copy.store().get_document("users", "u1").await.expect("get");
        assert!(doc.is_some());

        app.auth().sign_up("admin@example.com", "secret-pass").await.expect("sign up");
        assert_eq!(
            copy.auth().current_user().and_then(|user| user.email).as_deref(),
            Some("admin@example.com")
        );
    }

    #[test]
    fn builder_uses_configured_bucket_for_local_storage() {
        let options = AdminOptions::default().with_project_id("estate-demo");
        let app = AdminApp::builder(options).build().expect("app");
        assert_eq!(app.options().project_id.as_deref(), Some("estate-demo"));
    }

    #[test]
    fn connect_requires_project_and_api_key() {
        let err = AdminApp::connect(AdminOptions::default()).err().expect("error");
        assert!(matches!(err, AppError::MissingOption { option: "projectId" }));

        let err = AdminApp::connect(AdminOptions::default().with_project_id("p"))
            .err()
            .expect("error");
        assert!(matches!(err, AppError::MissingOption { option: "apiKey" }));
    }

    #[test]
    fn connect_builds_http_backends() {
        let options = AdminOptions::default()
            .with_project_id("estate-demo")
            .with_api_key("key");
        let app = AdminApp::connect(options).expect("app");
        assert!(app.auth().current_user().is_none());
    }
}
