use std::fmt;

use crate::auth::AuthError;
use crate::store::StoreError;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, Clone)]
pub enum AppError {
    MissingOption { option: &'static str },
    InvalidOptions { message: String },
    Store(StoreError),
    Auth(AuthError),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::MissingOption { option } => {
                write!(f, "Option '{option}' is required to connect to the managed backends")
            }
            AppError::InvalidOptions { message } => write!(f, "Invalid options: {message}"),
            AppError::Store(err) => write!(f, "Document store setup failed: {err}"),
            AppError::Auth(err) => write!(f, "Auth setup failed: {err}"),
        }
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AppError::Store(err) => Some(err),
            AppError::Auth(err) => Some(err),
            _ => None,
        }
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        AppError::Store(err)
    }
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        AppError::Auth(err)
    }
}
