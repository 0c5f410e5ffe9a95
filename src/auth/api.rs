use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Duration;

use crate::auth::backend::{AuthBackend, InMemoryAuthBackend};
use crate::auth::error::{
    backend_failure, invalid_argument, invalid_email, no_current_user, AuthError, AuthErrorCode,
    AuthResult,
};
use crate::auth::popup::OAuthPopupHandler;
use crate::auth::types::{AuthTokens, OAuthRequest, ProfileUpdate, SignInResult, UserInfo};
use crate::store::remote::TokenProvider;
use crate::store::{StoreError, StoreErrorCode, StoreResult};
use crate::util::{PartialObserver, Unsubscribe};

/// Id tokens are refreshed when they expire within this window.
pub const TOKEN_REFRESH_TOLERANCE_SECS: i64 = 5 * 60;

struct Session {
    generation: u64,
    user: UserInfo,
    tokens: AuthTokens,
    stale: bool,
}

#[derive(Default)]
struct AuthState {
    session: Option<Session>,
    observers: BTreeMap<u64, PartialObserver<Option<UserInfo>>>,
}

struct AuthInner {
    backend: Arc<dyn AuthBackend>,
    popup_handler: Option<Arc<dyn OAuthPopupHandler>>,
    state: Mutex<AuthState>,
    next_observer_id: AtomicU64,
    next_generation: AtomicU64,
}

/// Authentication facade.
///
/// Inputs are checked before reaching the backend; backend failures come
/// back with code `auth/backend` and an operation prefix. Cloning shares the
/// signed-in session.
#[derive(Clone)]
pub struct Auth {
    inner: Arc<AuthInner>,
}

impl fmt::Debug for Auth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Auth")
            .field("current_user", &self.current_user())
            .finish()
    }
}

impl Auth {
    pub fn new(backend: Arc<dyn AuthBackend>) -> Self {
        Self {
            inner: Arc::new(AuthInner {
                backend,
                popup_handler: None,
                state: Mutex::new(AuthState::default()),
                next_observer_id: AtomicU64::new(1),
                next_generation: AtomicU64::new(1),
            }),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryAuthBackend::new()))
    }

    /// Installs the handler used by [`Auth::sign_in_with_popup`].
    ///
    /// Must be called before the instance is cloned or shared.
    pub fn with_popup_handler(mut self, handler: Arc<dyn OAuthPopupHandler>) -> AuthResult<Self> {
        let inner = Arc::get_mut(&mut self.inner)
            .ok_or_else(|| invalid_argument("Popup handler must be set before Auth is shared"))?;
        inner.popup_handler = Some(handler);
        Ok(self)
    }

    pub fn current_user(&self) -> Option<UserInfo> {
        let state = self.inner.state.lock().unwrap();
        state.session.as_ref().map(|session| session.user.clone())
    }

    pub async fn sign_up(&self, email: &str, password: &str) -> AuthResult<UserInfo> {
        validate_email(email)?;
        require_non_blank("password", password)?;
        let result = self
            .inner
            .backend
            .sign_up(email.trim(), password)
            .await
            .map_err(|err| failure(format!("Failed to create account {}", email.trim()), err))?;
        Ok(self.establish(result))
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> AuthResult<UserInfo> {
        validate_email(email)?;
        require_non_blank("password", password)?;
        let result = self
            .inner
            .backend
            .sign_in_with_password(email.trim(), password)
            .await
            .map_err(|err| failure(format!("Failed to sign in {}", email.trim()), err))?;
        Ok(self.establish(result))
    }

    /// Opens the identity provider through the installed popup handler and
    /// exchanges the returned credential for a session.
    pub async fn sign_in_with_popup(&self, request: OAuthRequest) -> AuthResult<UserInfo> {
        require_non_blank("provider id", &request.provider_id)?;
        let handler = self.inner.popup_handler.clone().ok_or_else(|| {
            AuthError::new(
                AuthErrorCode::PopupUnavailable,
                "No OAuth popup handler is installed",
            )
        })?;
        let provider_id = request.provider_id.clone();
        let credential = handler.open_popup(request).await.map_err(|err| {
            log::warn!("OAuth popup for {provider_id} failed: {err}");
            err
        })?;
        let result = self
            .inner
            .backend
            .sign_in_with_idp(&credential)
            .await
            .map_err(|err| failure(format!("Failed to sign in with {provider_id}"), err))?;
        Ok(self.establish(result))
    }

    pub async fn send_password_reset_email(&self, email: &str) -> AuthResult<()> {
        validate_email(email)?;
        self.inner
            .backend
            .send_password_reset_email(email.trim())
            .await
            .map_err(|err| failure(format!("Failed to send password reset email to {}", email.trim()), err))
    }

    /// Clears the local session. Succeeds when nobody is signed in.
    pub async fn sign_out(&self) -> AuthResult<()> {
        let signed_out = {
            let mut state = self.inner.state.lock().unwrap();
            state.session.take().is_some()
        };
        if signed_out {
            log::debug!("signed out");
            self.notify(None);
        }
        Ok(())
    }

    pub async fn update_profile(&self, update: ProfileUpdate) -> AuthResult<UserInfo> {
        if update.is_empty() {
            return Err(invalid_argument("Profile update has no fields"));
        }
        let (generation, id_token) = self
            .session_token(false)
            .await?
            .ok_or_else(no_current_user)?;
        let updated = self
            .inner
            .backend
            .update_profile(&id_token, &update)
            .await
            .map_err(|err| failure("Failed to update profile", err))?;
        let user = {
            let mut state = self.inner.state.lock().unwrap();
            let session = state
                .session
                .as_mut()
                .filter(|session| session.generation == generation)
                .ok_or_else(no_current_user)?;
            session.user = updated.user;
            if let Some(tokens) = updated.tokens {
                session.tokens = tokens;
                session.stale = false;
            }
            session.user.clone()
        };
        self.notify(Some(user.clone()));
        Ok(user)
    }

    /// Registers `observer` for sign-in and sign-out events. The current state
    /// is delivered immediately.
    pub fn on_auth_state_changed(&self, observer: PartialObserver<Option<UserInfo>>) -> Unsubscribe {
        let id = self.inner.next_observer_id.fetch_add(1, Ordering::SeqCst);
        let current = {
            let mut state = self.inner.state.lock().unwrap();
            state.observers.insert(id, observer.clone());
            state.session.as_ref().map(|session| session.user.clone())
        };
        observer.notify_next(&current);

        let inner = Arc::downgrade(&self.inner);
        Box::new(move || {
            if let Some(inner) = inner.upgrade() {
                inner.state.lock().unwrap().observers.remove(&id);
            }
        })
    }

    /// The id token of the signed-in user, refreshed when close to expiry or
    /// when `force_refresh` is set. `None` when signed out.
    pub async fn get_token(&self, force_refresh: bool) -> AuthResult<Option<String>> {
        self.fresh_id_token(force_refresh).await
    }

    async fn fresh_id_token(&self, force_refresh: bool) -> AuthResult<Option<String>> {
        Ok(self
            .session_token(force_refresh)
            .await?
            .map(|(_, id_token)| id_token))
    }

    /// Id token paired with the generation of the session it belongs to.
    /// Refreshed tokens are only stored into the session they were requested
    /// for; if that session was replaced meanwhile, the current one is read
    /// again.
    async fn session_token(&self, force_refresh: bool) -> AuthResult<Option<(u64, String)>> {
        loop {
            let (generation, id_token, refresh_token, needs_refresh) = {
                let state = self.inner.state.lock().unwrap();
                let Some(session) = state.session.as_ref() else {
                    return Ok(None);
                };
                let needs_refresh = force_refresh
                    || session.stale
                    || session
                        .tokens
                        .expires_within(Duration::seconds(TOKEN_REFRESH_TOLERANCE_SECS));
                (
                    session.generation,
                    session.tokens.id_token.clone(),
                    session.tokens.refresh_token.clone(),
                    needs_refresh,
                )
            };
            if !needs_refresh {
                return Ok(Some((generation, id_token)));
            }

            log::debug!("refreshing id token");
            let tokens = self
                .inner
                .backend
                .refresh_tokens(&refresh_token)
                .await
                .map_err(|err| failure("Failed to refresh id token", err))?;
            {
                let mut state = self.inner.state.lock().unwrap();
                match state.session.as_mut() {
                    Some(session) if session.generation == generation => {
                        let id_token = tokens.id_token.clone();
                        session.tokens = tokens;
                        session.stale = false;
                        return Ok(Some((generation, id_token)));
                    }
                    Some(_) => {}
                    None => return Ok(None),
                }
            }
            log::debug!("session changed during token refresh; discarding refreshed tokens");
        }
    }

    fn establish(&self, result: SignInResult) -> UserInfo {
        let user = result.user.clone();
        {
            let mut state = self.inner.state.lock().unwrap();
            state.session = Some(Session {
                generation: self.inner.next_generation.fetch_add(1, Ordering::SeqCst),
                user: result.user,
                tokens: result.tokens,
                stale: false,
            });
        }
        log::debug!("signed in as {}", user.uid);
        self.notify(Some(user.clone()));
        user
    }

    fn notify(&self, user: Option<UserInfo>) {
        let observers: Vec<_> = {
            let state = self.inner.state.lock().unwrap();
            state.observers.values().cloned().collect()
        };
        for observer in observers {
            observer.notify_next(&user);
        }
    }
}

#[async_trait]
impl TokenProvider for Auth {
    async fn get_token(&self) -> StoreResult<Option<String>> {
        Auth::get_token(self, false)
            .await
            .map_err(|err| StoreError::new(StoreErrorCode::Unauthenticated, err.to_string()))
    }

    fn invalidate_token(&self) {
        if let Some(session) = self.inner.state.lock().unwrap().session.as_mut() {
            session.stale = true;
        }
    }
}

fn failure(prefix: impl fmt::Display, err: AuthError) -> AuthError {
    let err = backend_failure(prefix, err);
    log::warn!("{err}");
    err
}

fn require_non_blank(name: &str, value: &str) -> AuthResult<()> {
    if value.trim().is_empty() {
        return Err(invalid_argument(format!("The {name} must not be empty")));
    }
    Ok(())
}

/// Shape check only; deliverability is the backend's business.
pub(crate) fn validate_email(email: &str) -> AuthResult<()> {
    let email = email.trim();
    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !email.chars().any(char::is_whitespace)
        }
        None => false,
    };
    if valid {
        Ok(())
    } else {
        Err(invalid_email(email))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::backend::UpdatedAccount;
    use crate::auth::types::OAuthCredential;
    use crate::util::token::encode_unsigned;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;

    struct FakePopup;

    /// Issues `id-<name>`/`rt-<name>` for `<name>@example.com`; `alice`'s id
    /// token is already expiring. Refreshes and profile updates park until
    /// `release` is notified.
    #[derive(Default)]
    struct GatedBackend {
        entered: tokio::sync::Notify,
        release: tokio::sync::Notify,
    }

    impl GatedBackend {
        async fn park(&self) {
            self.entered.notify_one();
            self.release.notified().await;
        }
    }

    #[async_trait]
    impl AuthBackend for GatedBackend {
        async fn sign_up(&self, email: &str, password: &str) -> AuthResult<SignInResult> {
            self.sign_in_with_password(email, password).await
        }

        async fn sign_in_with_password(&self, email: &str, _password: &str) -> AuthResult<SignInResult> {
            let name = email.split('@').next().unwrap_or_default().to_string();
            let lifetime = if name == "alice" {
                Duration::seconds(0)
            } else {
                Duration::hours(1)
            };
            Ok(SignInResult {
                user: UserInfo {
                    uid: name.clone(),
                    email: Some(email.to_string()),
                    provider_id: "password".to_string(),
                    ..UserInfo::default()
                },
                tokens: AuthTokens::new(format!("id-{name}"), format!("rt-{name}"), lifetime),
                is_new_user: false,
            })
        }

        async fn sign_in_with_idp(&self, _credential: &OAuthCredential) -> AuthResult<SignInResult> {
            Err(invalid_argument("unsupported"))
        }

        async fn send_password_reset_email(&self, _email: &str) -> AuthResult<()> {
            Ok(())
        }

        async fn update_profile(
            &self,
            id_token: &str,
            update: &ProfileUpdate,
        ) -> AuthResult<UpdatedAccount> {
            self.park().await;
            Ok(UpdatedAccount {
                user: UserInfo {
                    uid: id_token.trim_start_matches("id-").to_string(),
                    display_name: update.display_name.clone(),
                    provider_id: "password".to_string(),
                    ..UserInfo::default()
                },
                tokens: None,
            })
        }

        async fn refresh_tokens(&self, refresh_token: &str) -> AuthResult<AuthTokens> {
            self.park().await;
            Ok(AuthTokens::new(
                format!("id-refreshed-from-{refresh_token}"),
                refresh_token.to_string(),
                Duration::hours(1),
            ))
        }
    }

    #[async_trait]
    impl OAuthPopupHandler for FakePopup {
        async fn open_popup(&self, request: OAuthRequest) -> AuthResult<OAuthCredential> {
            Ok(OAuthCredential {
                provider_id: request.provider_id,
                id_token: Some(encode_unsigned(&json!({"sub": "g-1", "email": "g@example.com"}))),
                access_token: None,
            })
        }
    }

    #[test]
    fn email_shapes() {
        assert!(validate_email("awa@example.com").is_ok());
        assert!(validate_email("  awa@example.com ").is_ok());
        for bad in ["", "awa", "@example.com", "awa@example", "a wa@example.com", "a@b@c.com"] {
            assert!(validate_email(bad).is_err(), "{bad} should be rejected");
        }
    }

    #[tokio::test]
    async fn sign_up_notifies_observers() {
        let auth = Auth::in_memory();
        let events = Arc::new(Mutex::new(Vec::new()));
        let unsubscribe = auth.on_auth_state_changed(PartialObserver::new().with_next({
            let events = events.clone();
            move |user: &Option<UserInfo>| {
                events.lock().unwrap().push(user.as_ref().and_then(|u| u.email.clone()));
            }
        }));

        auth.sign_up("awa@example.com", "secret1").await.unwrap();
        auth.sign_out().await.unwrap();
        unsubscribe();
        auth.sign_in("awa@example.com", "secret1").await.unwrap();

        assert_eq!(
            *events.lock().unwrap(),
            vec![None, Some("awa@example.com".to_string()), None]
        );
    }

    #[tokio::test]
    async fn invalid_input_never_reaches_backend() {
        let auth = Auth::in_memory();
        let err = auth.sign_in("not-an-email", "secret1").await.unwrap_err();
        assert_eq!(err.code, AuthErrorCode::InvalidEmail);
        let err = auth.sign_up("awa@example.com", "   ").await.unwrap_err();
        assert_eq!(err.code, AuthErrorCode::InvalidArgument);
    }

    #[tokio::test]
    async fn backend_errors_are_rewrapped() {
        let auth = Auth::in_memory();
        let err = auth.sign_in("ghost@example.com", "secret1").await.unwrap_err();
        assert_eq!(err.code, AuthErrorCode::Backend);
        assert_eq!(err.message(), "Failed to sign in ghost@example.com: EMAIL_NOT_FOUND");
    }

    #[tokio::test]
    async fn profile_update_requires_session() {
        let auth = Auth::in_memory();
        let err = auth
            .update_profile(ProfileUpdate::new().display_name("Awa"))
            .await
            .unwrap_err();
        assert_eq!(err.code, AuthErrorCode::NoCurrentUser);

        auth.sign_up("awa@example.com", "secret1").await.unwrap();
        let user = auth
            .update_profile(ProfileUpdate::new().display_name("Awa Diop"))
            .await
            .unwrap();
        assert_eq!(user.display_name.as_deref(), Some("Awa Diop"));
        assert_eq!(auth.current_user(), Some(user));
    }

    #[tokio::test]
    async fn invalidated_tokens_are_refreshed() {
        let auth = Auth::in_memory();
        auth.sign_up("awa@example.com", "secret1").await.unwrap();
        let first = auth.get_token(false).await.unwrap().unwrap();
        assert_eq!(auth.get_token(false).await.unwrap().unwrap(), first);

        TokenProvider::invalidate_token(&auth);
        let second = TokenProvider::get_token(&auth).await.unwrap().unwrap();
        assert_ne!(second, first);

        auth.sign_out().await.unwrap();
        assert!(auth.get_token(true).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn popup_sign_in_uses_handler() {
        let auth = Auth::in_memory();
        let err = auth.sign_in_with_popup(OAuthRequest::google()).await.unwrap_err();
        assert_eq!(err.code, AuthErrorCode::PopupUnavailable);

        let auth = Auth::in_memory().with_popup_handler(Arc::new(FakePopup)).unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let _unsubscribe = auth.on_auth_state_changed(PartialObserver::new().with_next({
            let calls = calls.clone();
            move |_: &Option<UserInfo>| {
                calls.fetch_add(1, Ordering::SeqCst);
            }
        }));
        let user = auth.sign_in_with_popup(OAuthRequest::google()).await.unwrap();
        assert_eq!(user.provider_id, "google.com");
        assert_eq!(user.email.as_deref(), Some("g@example.com"));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn refresh_finishing_after_user_switch_keeps_new_session() {
        let backend = Arc::new(GatedBackend::default());
        let auth = Auth::new(backend.clone());
        auth.sign_in("alice@example.com", "secret1").await.unwrap();

        let pending = tokio::spawn({
            let auth = auth.clone();
            async move { auth.get_token(false).await }
        });
        backend.entered.notified().await;
        auth.sign_out().await.unwrap();
        auth.sign_in("bob@example.com", "secret1").await.unwrap();
        backend.release.notify_one();

        let token = pending.await.unwrap().unwrap();
        assert_eq!(token.as_deref(), Some("id-bob"));
        assert_eq!(auth.current_user().map(|user| user.uid).as_deref(), Some("bob"));
        assert_eq!(auth.get_token(false).await.unwrap().as_deref(), Some("id-bob"));
    }

    #[tokio::test]
    async fn profile_update_finishing_after_user_switch_is_dropped() {
        let backend = Arc::new(GatedBackend::default());
        let auth = Auth::new(backend.clone());
        auth.sign_in("carol@example.com", "secret1").await.unwrap();

        let pending = tokio::spawn({
            let auth = auth.clone();
            async move {
                auth.update_profile(ProfileUpdate::new().display_name("Carol Sow"))
                    .await
            }
        });
        backend.entered.notified().await;
        auth.sign_out().await.unwrap();
        auth.sign_in("bob@example.com", "secret1").await.unwrap();
        backend.release.notify_one();

        let err = pending.await.unwrap().unwrap_err();
        assert_eq!(err.code, AuthErrorCode::NoCurrentUser);
        let current = auth.current_user().unwrap();
        assert_eq!(current.uid, "bob");
        assert_eq!(current.display_name, None);
    }
}
