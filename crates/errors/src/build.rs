//! Build and emission error types

use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum BuildError {
    #[error("build failed: {message}")]
    Failed { message: String },

    #[error("unable to write {section} tarball: {message}")]
    TarballFailed { section: String, message: String },

    #[error("unable to scan {path}: {message}")]
    ScanFailed { path: String, message: String },

    #[error("unable to write dependency log {path}: {message}")]
    DependencyLogFailed { path: String, message: String },

    #[error("unable to create output directory {path}: {message}")]
    OutputDirFailed { path: String, message: String },
}
