//! Authentication facade over an identity service.
//!
//! [`Auth`] wraps an [`AuthBackend`]: the process-local
//! [`InMemoryAuthBackend`] or the Identity Toolkit REST client
//! [`RestAuthBackend`]. It keeps the signed-in session, refreshes id tokens
//! and feeds them to the document store as a
//! [`TokenProvider`](crate::store::remote::TokenProvider).

mod api;
mod backend;
pub mod error;
mod popup;
mod types;

pub use api::{Auth, TOKEN_REFRESH_TOLERANCE_SECS};
pub use backend::{
    AuthBackend, InMemoryAuthBackend, RestAuthBackend, UpdatedAccount,
    DEFAULT_IDENTITY_TOOLKIT_ENDPOINT, DEFAULT_SECURE_TOKEN_ENDPOINT,
};
pub use error::{AuthError, AuthErrorCode, AuthResult};
pub use popup::OAuthPopupHandler;
pub use types::{AuthTokens, OAuthCredential, OAuthRequest, ProfileUpdate, SignInResult, UserInfo};
