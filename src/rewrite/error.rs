//! Rewrite error definitions.

use thiserror::Error;

use crate::matching::FilterError;

/// Errors that can occur while normalizing or storing rewrites.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RewriteError {
    /// The rewrite entry itself is absent.
    #[error("nil rewrite entry")]
    MissingEntry,

    /// A field cannot be expressed as rule text.
    #[error("invalid rewrite: {0}")]
    InvalidEntry(String),

    /// The compiled rule text could not be built into an engine.
    #[error("creating list storage: {0}")]
    Compile(#[from] FilterError),
}

/// Result type for rewrite operations.
pub type RewriteResult<T> = Result<T, RewriteError>;
