//! Error types for vizier-agent

use thiserror::Error;

/// Result type alias using vizier-agent Error
pub type Result<T> = std::result::Result<T, Error>;

/// Fatal orchestration errors. Tool-level failures never appear here: they
/// are recovered locally as error tool-results so the model can react.
#[derive(Error, Debug)]
pub enum Error {
    /// The model stream failed with a non-transient error
    #[error("model stream failed: {0}")]
    Stream(String),

    /// Transient failures persisted past the retry ceiling
    #[error("retries exhausted after {attempts} attempts: {last_error}")]
    RetriesExhausted { attempts: u32, last_error: String },

    /// The tool-use loop hit the defensive turn ceiling
    #[error("exchange exceeded the {0}-turn ceiling")]
    MaxTurnsExceeded(u32),

    /// A generic orchestration error
    #[error("{0}")]
    Other(String),
}
