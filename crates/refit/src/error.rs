//! Error types for refit.

use thiserror::Error;

/// Result type for refit operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in refit.
#[derive(Debug, Error)]
pub enum Error {
    /// Isolation channel failure: fork, channel read, a worker that died
    /// without a complete response, or a protocol violation.
    ///
    /// Unrecoverable; the in-flight load is aborted.
    #[error("channel error: {0}")]
    Channel(String),

    /// The rewrite engine failed for a file, or reported per-file errors.
    ///
    /// Recoverable at the interception boundary: the original file is
    /// served instead.
    #[error("transform failed: {0}")]
    Transform(String),

    /// Unusable configuration, such as a cache directory that cannot be
    /// created.
    #[error("configuration error: {0}")]
    Config(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
