//! Error taxonomy for the resolution core.
//!
//! None of these errors ever escapes to the host: every public entry point
//! folds them into a definite [`Outcome`](crate::pipeline::Outcome).

use thiserror::Error;

use crate::audit::writer::LogWriteError;
use crate::rules::store::StoreError;

/// Errors produced while resolving a single request.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// The requested URL could not be decoded.
    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    /// The requested URL targets a path that must never be redirected.
    #[error("protected URL: {0}")]
    ProtectedUrl(String),

    /// The rule store or log writer failed.
    #[error("persistence failure: {0}")]
    Persistence(String),

    /// A required setting is absent; the feature behaves as disabled.
    #[error("configuration missing: {0}")]
    ConfigurationMissing(&'static str),
}

impl From<StoreError> for ResolveError {
    fn from(err: StoreError) -> Self {
        ResolveError::Persistence(err.to_string())
    }
}

impl From<LogWriteError> for ResolveError {
    fn from(err: LogWriteError) -> Self {
        ResolveError::Persistence(err.to_string())
    }
}
