use std::error::Error;
use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageErrorCode {
    Unknown,
    InvalidArgument,
    ObjectNotFound,
    Unauthenticated,
    Unauthorized,
    QuotaExceeded,
    Canceled,
    NoDownloadUrl,
    InternalError,
    /// A backend failure rewrapped by a facade operation.
    Backend,
}

impl StorageErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageErrorCode::Unknown => "storage/unknown",
            StorageErrorCode::InvalidArgument => "storage/invalid-argument",
            StorageErrorCode::ObjectNotFound => "storage/object-not-found",
            StorageErrorCode::Unauthenticated => "storage/unauthenticated",
            StorageErrorCode::Unauthorized => "storage/unauthorized",
            StorageErrorCode::QuotaExceeded => "storage/quota-exceeded",
            StorageErrorCode::Canceled => "storage/canceled",
            StorageErrorCode::NoDownloadUrl => "storage/no-download-url",
            StorageErrorCode::InternalError => "storage/internal-error",
            StorageErrorCode::Backend => "storage/backend",
        }
    }
}

#[derive(Debug, Clone)]
pub struct StorageError {
    pub code: StorageErrorCode,
    message: String,
    pub status: Option<u16>,
    pub server_response: Option<String>,
}

impl StorageError {
    pub fn new(code: StorageErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            status: None,
            server_response: None,
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_server_response(mut self, response: impl Into<String>) -> Self {
        self.server_response = Some(response.into());
        self
    }

    pub fn code_str(&self) -> &'static str {
        self.code.as_str()
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl Display for StorageError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if let Some(server) = &self.server_response {
            write!(f, "{} ({}): {}", self.message, self.code_str(), server)
        } else {
            write!(f, "{} ({})", self.message, self.code_str())
        }
    }
}

impl Error for StorageError {}

pub type StorageResult<T> = Result<T, StorageError>;

pub fn invalid_argument(message: impl Into<String>) -> StorageError {
    StorageError::new(StorageErrorCode::InvalidArgument, message)
}

pub fn object_not_found(path: &str) -> StorageError {
    StorageError::new(
        StorageErrorCode::ObjectNotFound,
        format!("Object '{path}' does not exist."),
    )
}

pub fn canceled() -> StorageError {
    StorageError::new(StorageErrorCode::Canceled, "The upload was canceled.")
}

pub fn internal_error(message: impl Into<String>) -> StorageError {
    StorageError::new(StorageErrorCode::InternalError, message)
}

pub fn no_download_url() -> StorageError {
    StorageError::new(
        StorageErrorCode::NoDownloadUrl,
        "The requested object does not expose a download URL.",
    )
}

/// Maps a failed HTTP status to an error, keeping the raw body.
pub fn from_status(status: u16, path: &str, body: String) -> StorageError {
    let error = match status {
        401 => StorageError::new(
            StorageErrorCode::Unauthenticated,
            "User is not authenticated, please authenticate and try again.",
        ),
        403 => StorageError::new(
            StorageErrorCode::Unauthorized,
            format!("User does not have permission to access '{path}'."),
        ),
        404 => object_not_found(path),
        429 => StorageError::new(
            StorageErrorCode::QuotaExceeded,
            "Quota for the bucket has been exceeded.",
        ),
        _ => StorageError::new(
            StorageErrorCode::Unknown,
            format!("Storage request for '{path}' failed with status {status}."),
        ),
    };
    let error = error.with_status(status);
    if body.is_empty() {
        error
    } else {
        error.with_server_response(body)
    }
}

/// Rewraps a backend failure behind an operation-specific prefix.
///
/// Rejected inputs and canceled uploads pass through untouched.
pub fn backend_failure(prefix: impl Display, error: StorageError) -> StorageError {
    if matches!(
        error.code,
        StorageErrorCode::InvalidArgument | StorageErrorCode::Canceled
    ) {
        return error;
    }
    let mut wrapped = StorageError::new(
        StorageErrorCode::Backend,
        format!("{prefix}: {}", error.message),
    );
    wrapped.status = error.status;
    wrapped
}
