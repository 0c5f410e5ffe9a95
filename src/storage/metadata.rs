use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Object resource returned by uploads.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMetadata {
    #[serde(default)]
    pub bucket: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    /// Decimal string, as the REST API sends it.
    #[serde(default)]
    pub size: Option<String>,
    #[serde(default)]
    pub content_type: Option<String>,
    #[serde(default)]
    pub time_created: Option<String>,
    /// Comma separated download tokens.
    #[serde(default)]
    pub download_tokens: Option<String>,
}

impl ObjectMetadata {
    pub fn from_value(value: Value) -> Self {
        serde_json::from_value(value).unwrap_or_default()
    }

    pub fn size_bytes(&self) -> Option<u64> {
        self.size.as_deref().and_then(|size| size.parse().ok())
    }

    pub fn first_download_token(&self) -> Option<&str> {
        self.download_tokens
            .as_deref()
            .and_then(|tokens| tokens.split(',').find(|token| !token.is_empty()))
    }
}
