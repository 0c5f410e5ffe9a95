use std::error::Error;
use std::fmt::{Display, Formatter};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AuthErrorCode {
    InvalidArgument,
    InvalidEmail,
    WeakPassword,
    EmailAlreadyInUse,
    UserNotFound,
    InvalidCredential,
    UserDisabled,
    TokenExpired,
    TooManyRequests,
    OperationNotAllowed,
    NoCurrentUser,
    PopupUnavailable,
    PopupClosed,
    Network,
    Internal,
    /// A backend failure rewrapped by a facade operation.
    Backend,
}

impl AuthErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthErrorCode::InvalidArgument => "auth/invalid-argument",
            AuthErrorCode::InvalidEmail => "auth/invalid-email",
            AuthErrorCode::WeakPassword => "auth/weak-password",
            AuthErrorCode::EmailAlreadyInUse => "auth/email-already-in-use",
            AuthErrorCode::UserNotFound => "auth/user-not-found",
            AuthErrorCode::InvalidCredential => "auth/invalid-credential",
            AuthErrorCode::UserDisabled => "auth/user-disabled",
            AuthErrorCode::TokenExpired => "auth/user-token-expired",
            AuthErrorCode::TooManyRequests => "auth/too-many-requests",
            AuthErrorCode::OperationNotAllowed => "auth/operation-not-allowed",
            AuthErrorCode::NoCurrentUser => "auth/no-current-user",
            AuthErrorCode::PopupUnavailable => "auth/operation-not-supported-in-this-environment",
            AuthErrorCode::PopupClosed => "auth/popup-closed-by-user",
            AuthErrorCode::Network => "auth/network-request-failed",
            AuthErrorCode::Internal => "auth/internal-error",
            AuthErrorCode::Backend => "auth/backend",
        }
    }
}

#[derive(Clone, Debug)]
pub struct AuthError {
    pub code: AuthErrorCode,
    message: String,
}

impl AuthError {
    pub fn new(code: AuthErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn code_str(&self) -> &'static str {
        self.code.as_str()
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Whether the input was rejected before reaching a backend.
    pub fn is_validation(&self) -> bool {
        matches!(
            self.code,
            AuthErrorCode::InvalidArgument | AuthErrorCode::InvalidEmail
        )
    }
}

impl Display for AuthError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message, self.code_str())
    }
}

impl Error for AuthError {}

pub type AuthResult<T> = Result<T, AuthError>;

pub fn invalid_argument(message: impl Into<String>) -> AuthError {
    AuthError::new(AuthErrorCode::InvalidArgument, message)
}

pub fn invalid_email(email: &str) -> AuthError {
    AuthError::new(
        AuthErrorCode::InvalidEmail,
        format!("'{email}' is not a valid email address"),
    )
}

pub fn no_current_user() -> AuthError {
    AuthError::new(AuthErrorCode::NoCurrentUser, "No user is signed in")
}

pub fn network_error(message: impl Into<String>) -> AuthError {
    AuthError::new(AuthErrorCode::Network, message)
}

pub fn internal_error(message: impl Into<String>) -> AuthError {
    AuthError::new(AuthErrorCode::Internal, message)
}

/// Maps an Identity Toolkit error message (`EMAIL_EXISTS`,
/// `WEAK_PASSWORD : Password should be ...`) to an error.
pub fn map_identity_error(message: &str) -> AuthError {
    let (reason, detail) = match message.split_once(':') {
        Some((reason, detail)) => (reason.trim(), Some(detail.trim())),
        None => (message.trim(), None),
    };
    let code = match reason {
        "INVALID_EMAIL" | "MISSING_EMAIL" => AuthErrorCode::InvalidEmail,
        "WEAK_PASSWORD" => AuthErrorCode::WeakPassword,
        "EMAIL_EXISTS" => AuthErrorCode::EmailAlreadyInUse,
        "EMAIL_NOT_FOUND" | "USER_NOT_FOUND" => AuthErrorCode::UserNotFound,
        "INVALID_PASSWORD" | "INVALID_LOGIN_CREDENTIALS" | "INVALID_IDP_RESPONSE"
        | "INVALID_REFRESH_TOKEN" | "MISSING_PASSWORD" => AuthErrorCode::InvalidCredential,
        "USER_DISABLED" => AuthErrorCode::UserDisabled,
        "TOKEN_EXPIRED" | "INVALID_ID_TOKEN" | "CREDENTIAL_TOO_OLD_LOGIN_AGAIN" => {
            AuthErrorCode::TokenExpired
        }
        "TOO_MANY_ATTEMPTS_TRY_LATER" => AuthErrorCode::TooManyRequests,
        "OPERATION_NOT_ALLOWED" | "PASSWORD_LOGIN_DISABLED" => AuthErrorCode::OperationNotAllowed,
        _ => AuthErrorCode::Internal,
    };
    AuthError::new(code, detail.unwrap_or(reason).to_string())
}

/// Rewraps a backend failure behind an operation-specific prefix.
///
/// Validation failures pass through untouched.
pub fn backend_failure(prefix: impl Display, error: AuthError) -> AuthError {
    if error.is_validation() {
        return error;
    }
    AuthError::new(
        AuthErrorCode::Backend,
        format!("{prefix}: {}", error.message),
    )
}
