//! Error taxonomy shared by every front-end component.
//!
//! None of these are fatal: each is recovered where it originates and
//! reported to the user (inline in the auth modal, as a toast, or as a
//! blocking validation message).

use thiserror::Error;

/// Failure reported by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("invalid email or password")]
    InvalidCredentials,

    #[error("an account with this email already exists")]
    AccountExists,

    #[error("password is too weak: {0}")]
    WeakSecret(String),

    #[error("no user is signed in")]
    NoSession,

    #[error("{0}")]
    Provider(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("{0} is not supported by this backend")]
    Unsupported(&'static str),
}

/// Subscribe, write or decode failure on the message stream.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StreamError {
    #[error("could not subscribe to messages: {0}")]
    Subscribe(String),

    #[error("could not send message: {0}")]
    Write(String),

    #[error("could not read message: {0}")]
    Decode(String),
}

/// Input rejected locally, before any network call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{0} is required")]
    EmptyField(&'static str),

    #[error("only image files can be uploaded (got {0})")]
    NotAnImage(String),
}

/// Failure of the key-value storage layer.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

/// Top-level error for user-facing operations.
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    AuthFailure(#[from] AuthError),

    #[error("please sign in first")]
    NotAuthenticated,

    #[error(transparent)]
    StreamFailure(#[from] StreamError),

    #[error(transparent)]
    ValidationFailure(#[from] ValidationError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl AppError {
    /// Stable short name of the error class, used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::AuthFailure(_) => "auth_failure",
            AppError::NotAuthenticated => "not_authenticated",
            AppError::StreamFailure(_) => "stream_failure",
            AppError::ValidationFailure(_) => "validation_failure",
            AppError::Storage(_) => "storage",
        }
    }
}
