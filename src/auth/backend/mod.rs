use async_trait::async_trait;

use crate::auth::error::AuthResult;
use crate::auth::types::{AuthTokens, OAuthCredential, ProfileUpdate, SignInResult, UserInfo};

mod in_memory;
mod rest;

pub use in_memory::InMemoryAuthBackend;
pub use rest::{
    RestAuthBackend, DEFAULT_IDENTITY_TOOLKIT_ENDPOINT, DEFAULT_SECURE_TOKEN_ENDPOINT,
};

/// Account state after a profile change.
#[derive(Clone, Debug)]
pub struct UpdatedAccount {
    pub user: UserInfo,
    /// Present when the backend rotated the tokens.
    pub tokens: Option<AuthTokens>,
}

/// Identity service operations used by [`crate::auth::Auth`].
///
/// Errors carry precise codes (`auth/email-already-in-use`, ...); the
/// facade rewraps them.
#[async_trait]
pub trait AuthBackend: Send + Sync {
    async fn sign_up(&self, email: &str, password: &str) -> AuthResult<SignInResult>;

    async fn sign_in_with_password(&self, email: &str, password: &str) -> AuthResult<SignInResult>;

    async fn sign_in_with_idp(&self, credential: &OAuthCredential) -> AuthResult<SignInResult>;

    async fn send_password_reset_email(&self, email: &str) -> AuthResult<()>;

    async fn update_profile(
        &self,
        id_token: &str,
        update: &ProfileUpdate,
    ) -> AuthResult<UpdatedAccount>;

    async fn refresh_tokens(&self, refresh_token: &str) -> AuthResult<AuthTokens>;
}
