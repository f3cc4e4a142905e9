//! Three-state wrapper for everything the client asks of its backend.
//!
//! Failures travel as data: a repository never hands an `Err` to its caller,
//! it hands back `Resource::Error` with a message ready for display.

use std::fmt::Display;

#[must_use]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resource<T> {
    /// Operation in flight; carries no payload.
    Loading,
    Success(T),
    Error(String),
}

impl<T> Resource<T> {
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error(message.into())
    }

    /// Converts a fallible result, using the error's display form as message.
    pub fn from_result<E: Display>(result: Result<T, E>) -> Self {
        match result {
            Ok(value) => Self::Success(value),
            Err(err) => Self::Error(err.to_string()),
        }
    }

    /// Like [`Resource::from_result`], but substitutes `fallback` for an empty
    /// error message.
    pub fn from_result_or<E: Display>(result: Result<T, E>, fallback: &str) -> Self {
        match result {
            Ok(value) => Self::Success(value),
            Err(err) => {
                let message = err.to_string();
                if message.trim().is_empty() {
                    Self::Error(fallback.to_string())
                } else {
                    Self::Error(message)
                }
            }
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Resource<U> {
        match self {
            Self::Loading => Resource::Loading,
            Self::Success(value) => Resource::Success(f(value)),
            Self::Error(message) => Resource::Error(message),
        }
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, Self::Loading)
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    pub fn success(self) -> Option<T> {
        match self {
            Self::Success(value) => Some(value),
            _ => None,
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        match self {
            Self::Error(message) => Some(message),
            _ => None,
        }
    }

    pub fn as_ref(&self) -> Resource<&T> {
        match self {
            Self::Loading => Resource::Loading,
            Self::Success(value) => Resource::Success(value),
            Self::Error(message) => Resource::Error(message.clone()),
        }
    }
}
