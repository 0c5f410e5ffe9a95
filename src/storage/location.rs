use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};

use crate::storage::error::{invalid_argument, StorageResult};

/// Object path inside a bucket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    bucket: String,
    path: String,
}

impl Location {
    pub fn new(bucket: impl Into<String>, path: &str) -> StorageResult<Self> {
        validate_path(path)?;
        Ok(Self {
            bucket: bucket.into(),
            path: path.to_string(),
        })
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn full_server_url(&self) -> String {
        format!(
            "/b/{}/o/{}",
            utf8_percent_encode(&self.bucket, NON_ALPHANUMERIC),
            utf8_percent_encode(&self.path, NON_ALPHANUMERIC)
        )
    }

    pub fn bucket_only_server_url(&self) -> String {
        format!("/b/{}/o", utf8_percent_encode(&self.bucket, NON_ALPHANUMERIC))
    }
}

/// Non-blank, no leading or trailing `/`, no empty segments.
pub fn validate_path(path: &str) -> StorageResult<()> {
    if path.trim().is_empty() {
        return Err(invalid_argument("Storage path must not be empty"));
    }
    if path.starts_with('/') || path.ends_with('/') {
        return Err(invalid_argument(format!(
            "Storage path '{path}' must not start or end with '/'"
        )));
    }
    if path.split('/').any(|segment| segment.trim().is_empty()) {
        return Err(invalid_argument(format!(
            "Storage path '{path}' contains an empty segment"
        )));
    }
    Ok(())
}

/// Content type derived from the file extension.
pub fn content_type_for(path: &str) -> &'static str {
    let extension = path
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match extension.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "webp" => "image/webp",
        "gif" => "image/gif",
        "pdf" => "application/pdf",
        "json" => "application/json",
        "txt" => "text/plain",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_are_validated() {
        assert!(validate_path("properties/p1/cover.jpg").is_ok());
        for bad in ["", "  ", "/avatars/u1.png", "avatars/", "avatars//u1.png", "a/ /b"] {
            assert!(validate_path(bad).is_err(), "{bad:?} should be rejected");
        }
    }

    #[test]
    fn server_urls_are_encoded() {
        let location = Location::new("estate-demo.appspot.com", "avatars/u 1.png").unwrap();
        assert_eq!(
            location.full_server_url(),
            "/b/estate%2Ddemo%2Eappspot%2Ecom/o/avatars%2Fu%201%2Epng"
        );
        assert_eq!(location.bucket_only_server_url(), "/b/estate%2Ddemo%2Eappspot%2Ecom/o");
    }

    #[test]
    fn content_types() {
        assert_eq!(content_type_for("a/b.JPG"), "image/jpeg");
        assert_eq!(content_type_for("contracts/c1.pdf"), "application/pdf");
        assert_eq!(content_type_for("blob"), "application/octet-stream");
    }
}
