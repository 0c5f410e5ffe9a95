//! Application wiring: [`AdminOptions`] describes the backends and
//! [`AdminApp`] owns the facades built from them.

mod api;
mod errors;
mod options;

pub use api::{AdminApp, AdminAppBuilder};
pub use errors::{AppError, AppResult};
pub use options::{AdminOptions, RetryOptions, DEFAULT_POLL_INTERVAL_MS};
