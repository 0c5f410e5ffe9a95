use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{Duration, Utc};
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde_json::json;

use crate::auth::error::{map_identity_error, AuthResult};
use crate::auth::types::{AuthTokens, OAuthCredential, ProfileUpdate, SignInResult, UserInfo};
use crate::util::token::{decode_claims, encode_unsigned};

use super::{AuthBackend, UpdatedAccount};

const TOKEN_LIFETIME_SECS: i64 = 3_600;
const MIN_PASSWORD_LEN: usize = 6;
const PASSWORD_PROVIDER: &str = "password";

struct Account {
    password: Option<String>,
    profile: UserInfo,
    disabled: bool,
}

#[derive(Default)]
struct State {
    accounts: BTreeMap<String, Account>,
    uid_by_email: HashMap<String, String>,
    uid_by_idp: HashMap<String, String>,
    id_tokens: HashMap<String, String>,
    refresh_tokens: HashMap<String, String>,
    password_resets: Vec<String>,
    next_uid: u64,
}

impl State {
    fn create_account(&mut self, email: Option<String>, password: Option<String>, provider_id: &str) -> String {
        self.next_uid += 1;
        let uid = format!("uid-{:04}", self.next_uid);
        if let Some(email) = &email {
            self.uid_by_email.insert(email.to_lowercase(), uid.clone());
        }
        self.accounts.insert(
            uid.clone(),
            Account {
                password,
                profile: UserInfo {
                    uid: uid.clone(),
                    email,
                    provider_id: provider_id.to_string(),
                    ..Default::default()
                },
                disabled: false,
            },
        );
        uid
    }

    fn issue_tokens(&mut self, uid: &str) -> AuthTokens {
        let now = Utc::now();
        let email = self
            .accounts
            .get(uid)
            .and_then(|account| account.profile.email.clone());
        let id_token = encode_unsigned(&json!({
            "sub": uid,
            "email": email,
            "iat": now.timestamp(),
            "exp": now.timestamp() + TOKEN_LIFETIME_SECS,
            "jti": random_string(12),
        }));
        let refresh_token = random_string(40);
        self.id_tokens.insert(id_token.clone(), uid.to_string());
        self.refresh_tokens.insert(refresh_token.clone(), uid.to_string());
        AuthTokens::new(id_token, refresh_token, Duration::seconds(TOKEN_LIFETIME_SECS))
    }

    fn sign_in(&mut self, uid: &str, is_new_user: bool) -> AuthResult<SignInResult> {
        let account = self
            .accounts
            .get(uid)
            .ok_or_else(|| map_identity_error("USER_NOT_FOUND"))?;
        if account.disabled {
            return Err(map_identity_error("USER_DISABLED"));
        }
        let user = account.profile.clone();
        let tokens = self.issue_tokens(uid);
        Ok(SignInResult {
            user,
            tokens,
            is_new_user,
        })
    }
}

/// Process-local identity service with the error vocabulary of the managed
/// one. Id tokens are unsigned JWTs.
#[derive(Clone, Default)]
pub struct InMemoryAuthBackend {
    state: Arc<Mutex<State>>,
}

impl InMemoryAuthBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Blocks further sign-ins of the account registered under `email`.
    pub fn disable_account(&self, email: &str) -> bool {
        let mut state = self.state.lock().unwrap();
        let Some(uid) = state.uid_by_email.get(&email.to_lowercase()).cloned() else {
            return false;
        };
        match state.accounts.get_mut(&uid) {
            Some(account) => {
                account.disabled = true;
                true
            }
            None => false,
        }
    }

    /// Emails a password reset was requested for, oldest first.
    pub fn password_reset_requests(&self) -> Vec<String> {
        self.state.lock().unwrap().password_resets.clone()
    }

    pub fn account_count(&self) -> usize {
        self.state.lock().unwrap().accounts.len()
    }
}

#[async_trait]
impl AuthBackend for InMemoryAuthBackend {
    async fn sign_up(&self, email: &str, password: &str) -> AuthResult<SignInResult> {
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(map_identity_error(
                "WEAK_PASSWORD : Password should be at least 6 characters",
            ));
        }
        let mut state = self.state.lock().unwrap();
        if state.uid_by_email.contains_key(&email.to_lowercase()) {
            return Err(map_identity_error("EMAIL_EXISTS"));
        }
        let uid = state.create_account(
            Some(email.to_string()),
            Some(password.to_string()),
            PASSWORD_PROVIDER,
        );
        state.sign_in(&uid, true)
    }

    async fn sign_in_with_password(&self, email: &str, password: &str) -> AuthResult<SignInResult> {
        let mut state = self.state.lock().unwrap();
        let uid = state
            .uid_by_email
            .get(&email.to_lowercase())
            .cloned()
            .ok_or_else(|| map_identity_error("EMAIL_NOT_FOUND"))?;
        let matches = state
            .accounts
            .get(&uid)
            .and_then(|account| account.password.as_deref())
            .is_some_and(|stored| stored == password);
        if !matches {
            return Err(map_identity_error("INVALID_PASSWORD"));
        }
        state.sign_in(&uid, false)
    }

    async fn sign_in_with_idp(&self, credential: &OAuthCredential) -> AuthResult<SignInResult> {
        let claims = credential
            .id_token
            .as_deref()
            .map(decode_claims)
            .unwrap_or_default();
        let subject = claims
            .get("sub")
            .and_then(|value| value.as_str())
            .map(str::to_string)
            .or_else(|| credential.access_token.clone())
            .ok_or_else(|| map_identity_error("INVALID_IDP_RESPONSE : missing subject"))?;
        let link = format!("{}:{subject}", credential.provider_id);

        let mut state = self.state.lock().unwrap();
        if let Some(uid) = state.uid_by_idp.get(&link).cloned() {
            return state.sign_in(&uid, false);
        }
        let email = claims
            .get("email")
            .and_then(|value| value.as_str())
            .map(str::to_string);
        let uid = state.create_account(email, None, &credential.provider_id);
        if let Some(account) = state.accounts.get_mut(&uid) {
            account.profile.display_name = claims
                .get("name")
                .and_then(|value| value.as_str())
                .map(str::to_string);
            account.profile.photo_url = claims
                .get("picture")
                .and_then(|value| value.as_str())
                .map(str::to_string);
            account.profile.email_verified = account.profile.email.is_some();
        }
        state.uid_by_idp.insert(link, uid.clone());
        state.sign_in(&uid, true)
    }

    async fn send_password_reset_email(&self, email: &str) -> AuthResult<()> {
        let mut state = self.state.lock().unwrap();
        if !state.uid_by_email.contains_key(&email.to_lowercase()) {
            return Err(map_identity_error("EMAIL_NOT_FOUND"));
        }
        state.password_resets.push(email.to_string());
        Ok(())
    }

    async fn update_profile(
        &self,
        id_token: &str,
        update: &ProfileUpdate,
    ) -> AuthResult<UpdatedAccount> {
        let mut state = self.state.lock().unwrap();
        let uid = state
            .id_tokens
            .get(id_token)
            .cloned()
            .ok_or_else(|| map_identity_error("INVALID_ID_TOKEN"))?;
        let account = state
            .accounts
            .get_mut(&uid)
            .ok_or_else(|| map_identity_error("USER_NOT_FOUND"))?;
        if let Some(name) = &update.display_name {
            account.profile.display_name = (!name.is_empty()).then(|| name.clone());
        }
        if let Some(url) = &update.photo_url {
            account.profile.photo_url = (!url.is_empty()).then(|| url.clone());
        }
        Ok(UpdatedAccount {
            user: account.profile.clone(),
            tokens: None,
        })
    }

    async fn refresh_tokens(&self, refresh_token: &str) -> AuthResult<AuthTokens> {
        let mut state = self.state.lock().unwrap();
        let uid = state
            .refresh_tokens
            .remove(refresh_token)
            .ok_or_else(|| map_identity_error("INVALID_REFRESH_TOKEN"))?;
        if state.accounts.get(&uid).is_some_and(|account| account.disabled) {
            return Err(map_identity_error("USER_DISABLED"));
        }
        Ok(state.issue_tokens(&uid))
    }
}

fn random_string(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}
