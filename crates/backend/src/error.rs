use std::fmt;

use chanrelay_crypto::{KeyError, SealError};
use chanrelay_settings::SettingsError;
use thiserror::Error;

/// Structured error payload the backend chose to return
#[derive(Debug, Clone, PartialEq)]
pub struct ForwardedError {
    pub payload: serde_json::Value,
}

impl fmt::Display for ForwardedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.payload)
    }
}

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("Backend transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The backend answered 401: the end user's identity must be validated
    /// before the command can be retried.
    #[error("Must authenticate the username to use this command")]
    AuthorizationNeeded,

    #[error("{0}")]
    Forwarded(ForwardedError),

    #[error("Error decoding JSON error from backend: {source} | {body}")]
    Decode {
        source: serde_json::Error,
        body: String,
    },

    #[error("Backend HTTP error: {0}")]
    Status(u16),

    #[error("Backend returned {code}: {response}")]
    NotOk { code: u16, response: String },

    #[error("Backend returned a non-integer cache duration: {0:?}")]
    InvalidCacheDuration(String),

    #[error("Failed to seal request: {0}")]
    Seal(#[from] SealError),

    #[error("Invalid key: {0}")]
    Key(#[from] KeyError),

    #[error("Settings error: {0}")]
    Settings(#[from] SettingsError),
}

impl BackendError {
    /// Whether the caller should run the re-authentication flow
    pub fn requires_authentication(&self) -> bool {
        matches!(self, Self::AuthorizationNeeded)
    }

    /// HTTP status the backend answered with, if it answered
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::AuthorizationNeeded => Some(401),
            Self::Status(code) | Self::NotOk { code, .. } => Some(*code),
            Self::Transport(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// The forwarded payload, if the backend sent one
    pub fn forwarded_payload(&self) -> Option<&serde_json::Value> {
        match self {
            Self::Forwarded(forwarded) => Some(&forwarded.payload),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, BackendError>;
