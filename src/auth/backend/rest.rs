use async_trait::async_trait;
use chrono::Duration;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::auth::error::{internal_error, map_identity_error, network_error, AuthError, AuthResult};
use crate::auth::types::{AuthTokens, OAuthCredential, ProfileUpdate, SignInResult, UserInfo};

use super::{AuthBackend, UpdatedAccount};

pub const DEFAULT_IDENTITY_TOOLKIT_ENDPOINT: &str = "https://identitytoolkit.googleapis.com/v1";
pub const DEFAULT_SECURE_TOKEN_ENDPOINT: &str = "https://securetoken.googleapis.com/v1/token";

const AUTH_EMULATOR_HOST_ENV: &str = "FIREBASE_AUTH_EMULATOR_HOST";
const DEFAULT_EXPIRES_IN_SECS: i64 = 3_600;
const PASSWORD_PROVIDER: &str = "password";

fn identity_toolkit_url(base: &str, path: &str, api_key: &str) -> String {
    format!("{}/{}?key={}", base.trim_end_matches('/'), path, api_key)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PasswordRequest<'a> {
    email: &'a str,
    password: &'a str,
    return_secure_token: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SignInWithIdpRequest {
    post_body: String,
    request_uri: String,
    return_idp_credential: bool,
    return_secure_token: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SendOobCodeRequest<'a> {
    request_type: &'static str,
    email: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct UpdateAccountRequest<'a> {
    id_token: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    display_name: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    photo_url: Option<&'a str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    delete_attribute: Vec<&'static str>,
    return_secure_token: bool,
}

#[derive(Debug, Serialize)]
struct RefreshTokenRequest<'a> {
    grant_type: &'static str,
    refresh_token: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignInResponse {
    id_token: String,
    refresh_token: String,
    #[serde(default)]
    expires_in: Option<String>,
    local_id: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default, alias = "profilePicture")]
    photo_url: Option<String>,
    #[serde(default)]
    email_verified: Option<bool>,
    #[serde(default)]
    is_new_user: Option<bool>,
    #[serde(default)]
    provider_id: Option<String>,
}

impl SignInResponse {
    fn into_result(self, default_provider: &str, new_user: bool) -> SignInResult {
        let tokens = AuthTokens::new(
            self.id_token,
            self.refresh_token,
            parse_expires_in(self.expires_in.as_deref()),
        );
        SignInResult {
            user: UserInfo {
                uid: self.local_id,
                email: self.email,
                display_name: self.display_name,
                photo_url: self.photo_url,
                email_verified: self.email_verified.unwrap_or(false),
                provider_id: self.provider_id.unwrap_or_else(|| default_provider.to_string()),
            },
            tokens,
            is_new_user: self.is_new_user.unwrap_or(new_user),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProviderUserInfo {
    provider_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateAccountResponse {
    local_id: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    photo_url: Option<String>,
    #[serde(default)]
    email_verified: Option<bool>,
    #[serde(default)]
    provider_user_info: Vec<ProviderUserInfo>,
    #[serde(default)]
    id_token: Option<String>,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RefreshTokenResponse {
    id_token: String,
    refresh_token: String,
    #[serde(default)]
    expires_in: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: Option<ErrorBody>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: Option<String>,
}

/// Identity Toolkit v1 and Secure Token REST client.
#[derive(Clone, Debug)]
pub struct RestAuthBackend {
    client: Client,
    api_key: String,
    identity_toolkit_endpoint: String,
    secure_token_endpoint: String,
    request_uri: String,
}

impl RestAuthBackend {
    /// Targets the managed service, or the auth emulator when
    /// `FIREBASE_AUTH_EMULATOR_HOST` is set.
    pub fn new(api_key: impl Into<String>) -> Self {
        let backend = Self {
            client: Client::new(),
            api_key: api_key.into(),
            identity_toolkit_endpoint: DEFAULT_IDENTITY_TOOLKIT_ENDPOINT.to_string(),
            secure_token_endpoint: DEFAULT_SECURE_TOKEN_ENDPOINT.to_string(),
            request_uri: "http://localhost".to_string(),
        };
        match std::env::var(AUTH_EMULATOR_HOST_ENV) {
            Ok(host) if !host.trim().is_empty() => backend.with_emulator_host(host.trim()),
            _ => backend,
        }
    }

    pub fn with_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }

    pub fn with_emulator_host(self, host: &str) -> Self {
        let origin = format!("http://{}", host.trim_end_matches('/'));
        self.with_endpoints(
            format!("{origin}/identitytoolkit.googleapis.com/v1"),
            format!("{origin}/securetoken.googleapis.com/v1/token"),
        )
    }

    pub fn with_endpoints(
        mut self,
        identity_toolkit: impl Into<String>,
        secure_token: impl Into<String>,
    ) -> Self {
        self.identity_toolkit_endpoint = identity_toolkit.into();
        self.secure_token_endpoint = secure_token.into();
        self
    }

    /// The `requestUri` reported to `accounts:signInWithIdp`.
    pub fn with_request_uri(mut self, uri: impl Into<String>) -> Self {
        self.request_uri = uri.into();
        self
    }

    pub fn identity_toolkit_endpoint(&self) -> &str {
        &self.identity_toolkit_endpoint
    }

    async fn post_json<B, R>(&self, path: &str, body: &B) -> AuthResult<R>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let url = identity_toolkit_url(&self.identity_toolkit_endpoint, path, &self.api_key);
        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|err| network_error(err.to_string()))?;
        read_response(response, path).await
    }
}

async fn read_response<R: DeserializeOwned>(
    response: reqwest::Response,
    operation: &str,
) -> AuthResult<R> {
    let status = response.status();
    if status.is_success() {
        return response
            .json::<R>()
            .await
            .map_err(|err| internal_error(format!("Invalid {operation} response: {err}")));
    }
    let body = response.text().await.unwrap_or_default();
    Err(map_error_response(status, &body, operation))
}

fn map_error_response(status: StatusCode, body: &str, operation: &str) -> AuthError {
    serde_json::from_str::<ErrorResponse>(body)
        .ok()
        .and_then(|parsed| parsed.error)
        .and_then(|error| error.message)
        .map(|message| map_identity_error(&message))
        .unwrap_or_else(|| network_error(format!("{operation} failed with status {status}")))
}

fn parse_expires_in(value: Option<&str>) -> Duration {
    let seconds = value
        .and_then(|raw| raw.trim().parse::<i64>().ok())
        .unwrap_or(DEFAULT_EXPIRES_IN_SECS);
    Duration::seconds(seconds)
}

#[async_trait]
impl AuthBackend for RestAuthBackend {
    async fn sign_up(&self, email: &str, password: &str) -> AuthResult<SignInResult> {
        let request = PasswordRequest {
            email,
            password,
            return_secure_token: true,
        };
        let response: SignInResponse = self.post_json("accounts:signUp", &request).await?;
        Ok(response.into_result(PASSWORD_PROVIDER, true))
    }

    async fn sign_in_with_password(&self, email: &str, password: &str) -> AuthResult<SignInResult> {
        let request = PasswordRequest {
            email,
            password,
            return_secure_token: true,
        };
        let response: SignInResponse = self
            .post_json("accounts:signInWithPassword", &request)
            .await?;
        Ok(response.into_result(PASSWORD_PROVIDER, false))
    }

    async fn sign_in_with_idp(&self, credential: &OAuthCredential) -> AuthResult<SignInResult> {
        let request = SignInWithIdpRequest {
            post_body: credential.post_body(),
            request_uri: self.request_uri.clone(),
            return_idp_credential: true,
            return_secure_token: true,
        };
        let response: SignInResponse = self.post_json("accounts:signInWithIdp", &request).await?;
        Ok(response.into_result(&credential.provider_id, false))
    }

    async fn send_password_reset_email(&self, email: &str) -> AuthResult<()> {
        let request = SendOobCodeRequest {
            request_type: "PASSWORD_RESET",
            email,
        };
        let _: serde_json::Value = self.post_json("accounts:sendOobCode", &request).await?;
        Ok(())
    }

    async fn update_profile(
        &self,
        id_token: &str,
        update: &ProfileUpdate,
    ) -> AuthResult<UpdatedAccount> {
        let mut delete_attribute = Vec::new();
        let display_name = match update.display_name.as_deref() {
            Some("") => {
                delete_attribute.push("DISPLAY_NAME");
                None
            }
            other => other,
        };
        let photo_url = match update.photo_url.as_deref() {
            Some("") => {
                delete_attribute.push("PHOTO_URL");
                None
            }
            other => other,
        };
        let request = UpdateAccountRequest {
            id_token,
            display_name,
            photo_url,
            delete_attribute,
            return_secure_token: true,
        };
        let response: UpdateAccountResponse = self.post_json("accounts:update", &request).await?;
        let tokens = match (response.id_token, response.refresh_token) {
            (Some(id_token), Some(refresh_token)) => Some(AuthTokens::new(
                id_token,
                refresh_token,
                parse_expires_in(response.expires_in.as_deref()),
            )),
            _ => None,
        };
        let provider_id = response
            .provider_user_info
            .into_iter()
            .next()
            .map(|info| info.provider_id)
            .unwrap_or_else(|| PASSWORD_PROVIDER.to_string());
        Ok(UpdatedAccount {
            user: UserInfo {
                uid: response.local_id,
                email: response.email,
                display_name: response.display_name,
                photo_url: response.photo_url,
                email_verified: response.email_verified.unwrap_or(false),
                provider_id,
            },
            tokens,
        })
    }

    async fn refresh_tokens(&self, refresh_token: &str) -> AuthResult<AuthTokens> {
        let url = format!("{}?key={}", self.secure_token_endpoint, self.api_key);
        let request = RefreshTokenRequest {
            grant_type: "refresh_token",
            refresh_token,
        };
        let response = self
            .client
            .post(url)
            .form(&request)
            .send()
            .await
            .map_err(|err| network_error(err.to_string()))?;
        let refreshed: RefreshTokenResponse = read_response(response, "token refresh").await?;
        Ok(AuthTokens::new(
            refreshed.id_token,
            refreshed.refresh_token,
            parse_expires_in(refreshed.expires_in.as_deref()),
        ))
    }
}
