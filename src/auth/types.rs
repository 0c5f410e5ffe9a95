use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Profile of the signed-in account.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserInfo {
    pub uid: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub photo_url: Option<String>,
    #[serde(default)]
    pub email_verified: bool,
    /// `password` or the identity provider id (`google.com`, ...).
    pub provider_id: String,
}

/// Token pair issued on sign-in.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuthTokens {
    pub id_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
}

impl AuthTokens {
    pub fn new(id_token: String, refresh_token: String, expires_in: Duration) -> Self {
        Self {
            id_token,
            refresh_token,
            expires_at: Utc::now() + expires_in,
        }
    }

    /// True when the id token expires within `tolerance`.
    pub fn expires_within(&self, tolerance: Duration) -> bool {
        self.expires_at <= Utc::now() + tolerance
    }
}

/// Outcome of a successful sign-up or sign-in.
#[derive(Clone, Debug)]
pub struct SignInResult {
    pub user: UserInfo,
    pub tokens: AuthTokens,
    pub is_new_user: bool,
}

/// Profile fields to change. `None` leaves a field untouched; an empty string
/// clears it.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProfileUpdate {
    pub display_name: Option<String>,
    pub photo_url: Option<String>,
}

impl ProfileUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn display_name(mut self, value: impl Into<String>) -> Self {
        self.display_name = Some(value.into());
        self
    }

    pub fn photo_url(mut self, value: impl Into<String>) -> Self {
        self.photo_url = Some(value.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.display_name.is_none() && self.photo_url.is_none()
    }
}

/// Credential returned by an identity provider after the popup flow.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OAuthCredential {
    pub provider_id: String,
    pub id_token: Option<String>,
    pub access_token: Option<String>,
}

impl OAuthCredential {
    /// The `postBody` form expected by `accounts:signInWithIdp`.
    pub fn post_body(&self) -> String {
        let mut form = url::form_urlencoded::Serializer::new(String::new());
        if let Some(id_token) = &self.id_token {
            form.append_pair("id_token", id_token);
        }
        if let Some(access_token) = &self.access_token {
            form.append_pair("access_token", access_token);
        }
        form.append_pair("providerId", &self.provider_id);
        form.finish()
    }
}

/// What the popup handler needs to open an identity provider.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OAuthRequest {
    pub provider_id: String,
    pub scopes: Vec<String>,
    pub custom_parameters: BTreeMap<String, String>,
    pub language_code: Option<String>,
}

impl OAuthRequest {
    pub fn new(provider_id: impl Into<String>) -> Self {
        Self {
            provider_id: provider_id.into(),
            scopes: Vec::new(),
            custom_parameters: BTreeMap::new(),
            language_code: None,
        }
    }

    pub fn google() -> Self {
        Self::new("google.com").with_scope("profile").with_scope("email")
    }

    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        let scope = scope.into();
        if !self.scopes.contains(&scope) {
            self.scopes.push(scope);
        }
        self
    }

    pub fn with_custom_parameter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.custom_parameters.insert(key.into(), value.into());
        self
    }

    pub fn with_language_code(mut self, value: impl Into<String>) -> Self {
        self.language_code = Some(value.into());
        self
    }
}
