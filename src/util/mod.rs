pub mod backoff;
pub mod runtime;
pub mod subscribe;
pub mod token;

pub use backoff::{BackoffConfig, MAX_BACKOFF_MILLIS, RANDOM_FACTOR};
pub use subscribe::{PartialObserver, Unsubscribe};
