//! Typed records of the back office and their display labels.
//!
//! Records serialize to the camelCase shape stored in the document database.
//! References between records are plain id strings; nothing checks that a
//! referenced record exists.

use serde::de::DeserializeOwned;
use serde::Serialize;

mod activity;
mod contract;
pub mod labels;
mod message;
mod partner;
mod property;
mod statistics;
mod transaction;
mod user;

pub use activity::ActivityLog;
pub use contract::{Contract, ContractStatus, SignatureStatus};
pub use labels::{generic_error, role_label, status_label, Labelled, Locale};
pub use message::{Message, MessageStatus, MessageType};
pub use partner::{Partner, PartnerType};
pub use property::{Property, PropertyStatus, PropertyType, ValidationStatus};
pub use statistics::{MonthlyRevenue, Statistics};
pub use transaction::{Transaction, TransactionStatus, TransactionType};
pub use user::{IdType, NotificationPreferences, User, UserRole, UserStatus};

/// A record stored in its own collection, keyed by document id.
pub trait Entity: Serialize + DeserializeOwned + Send + Sync {
    const COLLECTION: &'static str;

    fn id(&self) -> &str;
}
