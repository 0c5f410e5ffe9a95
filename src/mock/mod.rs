//! Mock records for demos, tests and local development.
//!
//! Generators are pure functions of the random number generator they are
//! given; seed a [`rand::rngs::StdRng`] for reproducible data. The `mock_*`
//! helpers use the thread RNG.
//!
//! Cross references (`ownerId`, `userId`, `propertyId`, ...) are drawn from
//! fixed id ranges independently of the generated records, so a reference may
//! point at nothing.

mod dataset;
mod generators;
mod pools;

pub use dataset::{seed_store, MockDataset, MockSizes};
pub use generators::{
    generate_activity_logs, generate_contracts, generate_messages, generate_partners,
    generate_properties, generate_transactions, generate_users, super_admin,
    REFERENCED_USER_IDS, SUPER_ADMIN_ID,
};

use crate::domain::{
    ActivityLog, Contract, Message, Partner, Property, Statistics, Transaction, User,
};

/// The super administrator followed by users `2..=40`.
pub fn mock_users() -> Vec<User> {
    let mut users = vec![super_admin()];
    users.extend(generate_users(&mut rand::thread_rng(), 2..=40));
    users
}

pub fn mock_properties(count: usize) -> Vec<Property> {
    generate_properties(&mut rand::thread_rng(), count)
}

pub fn mock_transactions(count: usize) -> Vec<Transaction> {
    generate_transactions(&mut rand::thread_rng(), count)
}

pub fn mock_contracts(count: usize) -> Vec<Contract> {
    generate_contracts(&mut rand::thread_rng(), count)
}

pub fn mock_messages(count: usize) -> Vec<Message> {
    generate_messages(&mut rand::thread_rng(), count)
}

pub fn mock_partners(count: usize) -> Vec<Partner> {
    generate_partners(&mut rand::thread_rng(), count)
}

pub fn mock_activity_logs(count: usize) -> Vec<ActivityLog> {
    generate_activity_logs(&mut rand::thread_rng(), count)
}

/// Aggregates over a freshly generated default dataset.
pub fn mock_statistics() -> Statistics {
    MockDataset::generate(&mut rand::thread_rng()).statistics
}
