//! Signing error types

use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum SigningError {
    #[error("unable to read signing key {path}: {message}")]
    KeyUnreadable { path: String, message: String },

    #[error("unable to parse signing key {path}: {message}")]
    KeyInvalid { path: String, message: String },

    #[error("signature generation failed: {message}")]
    SignatureFailed { message: String },
}
