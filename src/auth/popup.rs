use async_trait::async_trait;

use crate::auth::error::AuthResult;
use crate::auth::types::{OAuthCredential, OAuthRequest};

/// Opens an identity provider for interactive sign-in.
///
/// Host applications implement this with whatever window or browser they
/// have; the library only consumes the resulting credential. Returning an
/// error with [`AuthErrorCode::PopupClosed`](crate::auth::AuthErrorCode::PopupClosed)
/// signals that the user dismissed the dialog.
#[async_trait]
pub trait OAuthPopupHandler: Send + Sync {
    async fn open_popup(&self, request: OAuthRequest) -> AuthResult<OAuthCredential>;
}
