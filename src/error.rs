//! Error types for Snapgram
//!
//! All errors surfaced by the gateway, the query cache, and the session
//! store are converted to `AppError`. The type is `Clone` because a single
//! settled fetch is delivered to every subscriber attached to it.

use std::sync::Arc;

use thiserror::Error;

/// Application-wide error type
#[derive(Debug, Clone, Error)]
pub enum AppError {
    /// Backend or network failure for a named gateway operation
    #[error("Remote operation `{operation}` failed: {cause}")]
    Remote {
        operation: &'static str,
        cause: String,
    },

    /// Input failed a declared field constraint
    #[error("Validation error on `{field}`: {message}")]
    Validation {
        field: &'static str,
        message: String,
    },

    /// Requested entity does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Operation attempted without the identity or state it requires
    #[error("Invalid state: {0}")]
    State(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Unexpected internal failure
    #[error("Internal error: {0}")]
    Internal(Arc<anyhow::Error>),
}

impl AppError {
    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        AppError::Validation {
            field,
            message: message.into(),
        }
    }

    pub fn internal(message: impl std::fmt::Display) -> Self {
        AppError::Internal(Arc::new(anyhow::anyhow!("{message}")))
    }

    /// Short label used for metrics and log fields
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Remote { .. } => "remote",
            AppError::Validation { .. } => "validation",
            AppError::NotFound(_) => "not_found",
            AppError::State(_) => "state",
            AppError::Config(_) => "config",
            AppError::Internal(_) => "internal",
        }
    }

    /// Field name for validation errors, shown inline next to the input
    pub fn field(&self) -> Option<&'static str> {
        match self {
            AppError::Validation { field, .. } => Some(field),
            _ => None,
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(Arc::new(err))
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Config(err.to_string())
    }
}

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;
