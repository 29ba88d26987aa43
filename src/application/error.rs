//! Application-level errors (wraps domain errors)

use thiserror::Error;

use crate::domain::DomainError;

/// Application errors wrap domain errors and add application-level context.
#[derive(Error, Debug)]
pub enum ApplicationError {
    #[error("{0}")]
    Domain(#[from] DomainError),

    #[error("invalid specification: {message}")]
    Spec { message: String },

    #[error("config error: {message}")]
    Config { message: String },
}

impl ApplicationError {
    pub(crate) fn spec(message: impl Into<String>) -> Self {
        Self::Spec {
            message: message.into(),
        }
    }
}

/// Result type for application layer operations.
pub type ApplicationResult<T> = Result<T, ApplicationError>;
