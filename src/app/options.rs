use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::app::errors::{AppError, AppResult};
use crate::store::remote::RetrySettings;

pub const DEFAULT_POLL_INTERVAL_MS: u64 = 5_000;

const ENV_API_KEY: &str = "FIREBASE_API_KEY";
const ENV_AUTH_DOMAIN: &str = "FIREBASE_AUTH_DOMAIN";
const ENV_PROJECT_ID: &str = "FIREBASE_PROJECT_ID";
const ENV_STORAGE_BUCKET: &str = "FIREBASE_STORAGE_BUCKET";
const ENV_APP_ID: &str = "FIREBASE_APP_ID";
const ENV_POLL_INTERVAL_MS: &str = "FIREBASE_POLL_INTERVAL_MS";
const ENV_FIRESTORE_EMULATOR: &str = "FIRESTORE_EMULATOR_HOST";
const ENV_AUTH_EMULATOR: &str = "FIREBASE_AUTH_EMULATOR_HOST";
const ENV_STORAGE_EMULATOR: &str = "FIREBASE_STORAGE_EMULATOR_HOST";

/// Backend configuration, in the shape of the web app's Firebase config
/// object plus emulator and polling settings.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AdminOptions {
    pub api_key: Option<String>,
    pub auth_domain: Option<String>,
    pub project_id: Option<String>,
    pub storage_bucket: Option<String>,
    pub app_id: Option<String>,
    pub firestore_emulator_host: Option<String>,
    pub auth_emulator_host: Option<String>,
    pub storage_emulator_host: Option<String>,
    /// Interval between polls of HTTP snapshot listeners.
    pub poll_interval_ms: Option<u64>,
    pub retry: RetryOptions,
}

/// Retry policy for document store requests.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RetryOptions {
    pub max_attempts: usize,
    pub initial_delay_ms: u64,
    pub multiplier: f64,
    pub max_delay_ms: u64,
    pub request_timeout_ms: u64,
}

impl Default for RetryOptions {
    fn default() -> Self {
        let settings = RetrySettings::default();
        Self {
            max_attempts: settings.max_attempts,
            initial_delay_ms: settings.initial_delay.as_millis() as u64,
            multiplier: settings.multiplier,
            max_delay_ms: settings.max_delay.as_millis() as u64,
            request_timeout_ms: settings.request_timeout.as_millis() as u64,
        }
    }
}

impl RetryOptions {
    pub fn to_settings(&self) -> RetrySettings {
        RetrySettings {
            max_attempts: self.max_attempts.max(1),
            initial_delay: Duration::from_millis(self.initial_delay_ms),
            multiplier: self.multiplier,
            max_delay: Duration::from_millis(self.max_delay_ms),
            request_timeout: Duration::from_millis(self.request_timeout_ms),
        }
    }
}

impl AdminOptions {
    /// Reads `FIREBASE_*` variables and the standard emulator variables.
    pub fn from_env() -> AppResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Parses a camelCase JSON config object.
    pub fn from_json(json: &str) -> AppResult<Self> {
        serde_json::from_str(json).map_err(|err| AppError::InvalidOptions {
            message: err.to_string(),
        })
    }

    pub(crate) fn from_lookup<F>(lookup: F) -> AppResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |key: &str| lookup(key).map(|value| value.trim().to_string()).filter(|v| !v.is_empty());
        let poll_interval_ms = match read(ENV_POLL_INTERVAL_MS) {
            Some(raw) => Some(raw.parse::<u64>().map_err(|_| AppError::InvalidOptions {
                message: format!("{ENV_POLL_INTERVAL_MS} must be a whole number of milliseconds, got '{raw}'"),
            })?),
            None => None,
        };
        Ok(Self {
            api_key: read(ENV_API_KEY),
            auth_domain: read(ENV_AUTH_DOMAIN),
            project_id: read(ENV_PROJECT_ID),
            storage_bucket: read(ENV_STORAGE_BUCKET),
            app_id: read(ENV_APP_ID),
            firestore_emulator_host: read(ENV_FIRESTORE_EMULATOR),
            auth_emulator_host: read(ENV_AUTH_EMULATOR),
            storage_emulator_host: read(ENV_STORAGE_EMULATOR),
            poll_interval_ms,
            retry: RetryOptions::default(),
        })
    }

    pub fn with_project_id(mut self, project_id: impl Into<String>) -> Self {
        self.project_id = Some(project_id.into());
        self
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_storage_bucket(mut self, bucket: impl Into<String>) -> Self {
        self.storage_bucket = Some(bucket.into());
        self
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.unwrap_or(DEFAULT_POLL_INTERVAL_MS).max(1))
    }

    pub fn require_project_id(&self) -> AppResult<&str> {
        require(self.project_id.as_deref(), "projectId")
    }

    pub fn require_api_key(&self) -> AppResult<&str> {
        require(self.api_key.as_deref(), "apiKey")
    }

    /// The configured bucket, or the project's default one.
    pub fn bucket(&self) -> AppResult<String> {
        if let Some(bucket) = self.storage_bucket.as_deref().filter(|b| !b.trim().is_empty()) {
            return Ok(bucket.trim().to_string());
        }
        Ok(format!("{}.appspot.com", self.require_project_id()?))
    }
}

fn require<'a>(value: Option<&'a str>, option: &'static str) -> AppResult<&'a str> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or(AppError::MissingOption { option })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn parses_web_config_object() {
        let options = AdminOptions::from_json(
            r#"{
                "apiKey": "key",
                "authDomain": "estate-demo.firebaseapp.com",
                "projectId": "estate-demo",
                "storageBucket": "estate-demo.appspot.com",
                "messagingSenderId": "123",
                "appId": "1:123:web:abc"
            }"#,
        )
        .expect("options");
        assert_eq!(options.require_api_key().unwrap(), "key");
        assert_eq!(options.bucket().unwrap(), "estate-demo.appspot.com");
        assert_eq!(options.poll_interval(), Duration::from_secs(5));
        assert_eq!(options.retry, RetryOptions::default());
    }

    #[test]
    fn reads_environment_lookup() {
        let vars: HashMap<&str, &str> = [
            ("FIREBASE_PROJECT_ID", "estate-demo"),
            ("FIREBASE_API_KEY", " key "),
            ("FIRESTORE_EMULATOR_HOST", "localhost:8080"),
            ("FIREBASE_POLL_INTERVAL_MS", "250"),
            ("FIREBASE_APP_ID", ""),
        ]
        .into_iter()
        .collect();
        let options =
            AdminOptions::from_lookup(|key| vars.get(key).map(|v| v.to_string())).expect("options");
        assert_eq!(options.api_key.as_deref(), Some("key"));
        assert_eq!(options.app_id, None);
        assert_eq!(options.firestore_emulator_host.as_deref(), Some("localhost:8080"));
        assert_eq!(options.poll_interval(), Duration::from_millis(250));
        assert_eq!(options.bucket().unwrap(), "estate-demo.appspot.com");
    }

    #[test]
    fn rejects_bad_poll_interval_and_missing_project() {
        let err = AdminOptions::from_lookup(|key| {
            (key == "FIREBASE_POLL_INTERVAL_MS").then(|| "soon".to_string())
        })
        .unwrap_err();
        assert!(matches!(err, AppError::InvalidOptions { .. }));

        let err = AdminOptions::default().require_project_id().unwrap_err();
        assert!(err.to_string().contains("projectId"));
    }
}
