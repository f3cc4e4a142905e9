use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    Transport,
    NotFound,
    Malformed,
    Rejected,
    PartialFailure,
}

/// Every fault a backend call can produce. The display form is the
/// human-readable message shown to the user.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    #[error("{0}")]
    Transport(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Malformed(String),
    #[error("{0}")]
    Rejected(String),
    /// Register created the credential but the profile write failed.
    #[error("{0}")]
    PartialFailure(String),
}

impl BackendError {
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::Malformed(message.into())
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self::Rejected(message.into())
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Transport(_) => ErrorCode::Transport,
            Self::NotFound(_) => ErrorCode::NotFound,
            Self::Malformed(_) => ErrorCode::Malformed,
            Self::Rejected(_) => ErrorCode::Rejected,
            Self::PartialFailure(_) => ErrorCode::PartialFailure,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::Transport(message)
            | Self::NotFound(message)
            | Self::Malformed(message)
            | Self::Rejected(message)
            | Self::PartialFailure(message) => message,
        }
    }
}

impl From<serde_json::Error> for BackendError {
    fn from(value: serde_json::Error) -> Self {
        Self::Malformed(value.to_string())
    }
}
