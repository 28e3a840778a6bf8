mod firestore;
mod identity;

pub use firestore::{collection_path, FirestoreStore};
pub use identity::{FirebaseIdentity, IdpTokenSource, TOKEN_KEY};

use serde::Deserialize;
use thiserror::Error;

use so_core::error::{AuthError, StreamError};

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors that can occur when talking to the Firebase REST APIs.
#[derive(Debug, Error)]
pub enum FirebaseError {
    /// Network failure, timeout or other transport-level problem.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Firebase answered with an error body.
    ///
    /// `message` is the API's error code, e.g. `EMAIL_EXISTS` or
    /// `WEAK_PASSWORD : Password should be at least 6 characters`.
    #[error("Firebase API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// The web API key environment variable is unset or empty.
    #[error("missing Firebase API key (set {0})")]
    MissingApiKey(String),

    #[error("missing Firebase project id")]
    MissingProject,

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// A response parsed as JSON but lacked a required field.
    #[error("unexpected response: {0}")]
    Decode(String),
}

pub type Result<T> = std::result::Result<T, FirebaseError>;

impl FirebaseError {
    /// The Identity Toolkit error code without its human suffix.
    pub fn code(&self) -> Option<&str> {
        match self {
            FirebaseError::Api { message, .. } => {
                Some(message.split(" : ").next().unwrap_or(message).trim())
            }
            _ => None,
        }
    }

    pub fn into_auth(self) -> AuthError {
        if let FirebaseError::Http(e) = &self {
            return AuthError::Network(e.to_string());
        }
        match self.code() {
            Some(
                "EMAIL_NOT_FOUND" | "INVALID_PASSWORD" | "INVALID_LOGIN_CREDENTIALS" | "INVALID_EMAIL",
            ) => AuthError::InvalidCredentials,
            Some("EMAIL_EXISTS") => AuthError::AccountExists,
            Some("WEAK_PASSWORD") => {
                let detail = match &self {
                    FirebaseError::Api { message, .. } => message
                        .split_once(" : ")
                        .map(|(_, d)| d.trim().to_string())
                        .unwrap_or_else(|| "choose a longer password".to_string()),
                    _ => String::new(),
                };
                AuthError::WeakSecret(detail)
            }
            Some("TOKEN_EXPIRED" | "INVALID_REFRESH_TOKEN" | "USER_NOT_FOUND" | "INVALID_ID_TOKEN") => {
                AuthError::NoSession
            }
            Some("USER_DISABLED") => AuthError::Provider("this account has been disabled".to_string()),
            Some("TOO_MANY_ATTEMPTS_TRY_LATER") => {
                AuthError::Provider("too many attempts, try again later".to_string())
            }
            _ => AuthError::Provider(self.to_string()),
        }
    }

    pub fn into_write(self) -> StreamError {
        StreamError::Write(self.to_string())
    }

    pub fn into_subscribe(self) -> StreamError {
        match self {
            FirebaseError::Decode(msg) => StreamError::Decode(msg),
            FirebaseError::Serde(e) => StreamError::Decode(e.to_string()),
            other => StreamError::Subscribe(other.to_string()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

/// Pass a successful response through, turn anything else into
/// [`FirebaseError::Api`].
async fn check(resp: reqwest::Response) -> Result<reqwest::Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let text = resp.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorEnvelope>(&text)
        .map(|e| e.error.message)
        .unwrap_or(text);
    Err(FirebaseError::Api {
        status: status.as_u16(),
        message,
    })
}

fn trim_base(url: &str) -> String {
    url.trim_end_matches('/').to_string()
}
