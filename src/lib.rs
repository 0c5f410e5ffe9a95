//! Data layer of a real-estate management back office.
//!
//! - [`store`]: document CRUD, paginated queries, snapshot listeners, atomic
//!   batches and transactions over a [`store::Datastore`].
//! - [`auth`]: email/password and OAuth sign-in, profile updates, auth state
//!   subscriptions and id tokens.
//! - [`storage`]: file uploads with progress, download URLs and deletion.
//! - [`domain`]: typed records (users, properties, transactions, contracts,
//!   messages, partners, activity logs) and their labels.
//! - [`mock`]: seeded generators for every record type.
//! - [`admin`]: the user management screen's controller.
//! - [`app`]: configuration and the backend bundle handed to the screens.
//!
//! Every backend seam has a process-local implementation and an HTTP client
//! for the managed Firebase services.
//!
//! ```
//! use estate_admin::app::AdminApp;
//! use estate_admin::mock::{seed_store, MockDataset};
//!
//! # let runtime = tokio::runtime::Builder::new_current_thread().enable_time().build().unwrap();
//! # runtime.block_on(async {
//! let app = AdminApp::in_memory();
//! let dataset = MockDataset::generate(&mut rand::thread_rng());
//! let written = seed_store(app.store(), &dataset).await.unwrap();
//! assert_eq!(written, dataset.document_count());
//! # });
//! ```

pub mod admin;
pub mod app;
pub mod auth;
pub mod domain;
pub mod mock;
pub mod storage;
pub mod store;
pub mod util;

#[cfg(test)]
pub mod test_support;
