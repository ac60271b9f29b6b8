//! Error types for the async manager.

use riakpersist_client::StoreError;
use thiserror::Error;

use crate::migration::MigrationError;

/// Errors that can occur in manager operations.
#[derive(Debug, Error)]
pub enum Error {
    /// A store call failed.
    #[error("storage error: {0}")]
    Storage(#[from] StoreError),

    /// The migration chain of a model is broken.
    #[error("migration error: {0}")]
    Migration(#[from] MigrationError),

    /// The manager configuration is invalid.
    #[error("configuration error: {message}")]
    Config { message: String },

    /// A blocking task on the worker pool did not complete.
    #[error("worker error: {message}")]
    Worker { message: String },

    /// Post-processing of map-reduce rows failed.
    #[error("map-reduce processing error: {message}")]
    Mapper { message: String },
}

impl Error {
    pub fn config(message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
        }
    }

    pub fn mapper(message: impl Into<String>) -> Self {
        Error::Mapper {
            message: message.into(),
        }
    }
}

/// Result type alias for manager operations.
pub type Result<T> = std::result::Result<T, Error>;
