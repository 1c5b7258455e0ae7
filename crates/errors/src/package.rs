//! Package-related error types

use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum PackageError {
    #[error("staging directory unavailable: {path}: {message}")]
    StagingUnavailable { path: String, message: String },

    #[error("invalid package format: {message}")]
    InvalidFormat { message: String },
}
