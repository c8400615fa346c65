//! Crate-wide error types.

use thiserror::Error;

/// Crate-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Crate-wide error type.
///
/// The first five variants form the request taxonomy callers act on; the
/// rest are ambient failures surfaced from the standard library and the
/// serialization stack.
#[derive(Error, Debug)]
pub enum Error {
    /// Extractor output could not be decoded. Fatal, never retried.
    #[error("Parse error: {0}")]
    Parse(String),

    /// The extraction tool reported an error line or exited non-zero.
    #[error("{0}")]
    Extraction(String),

    /// No source stream satisfies a required media kind.
    #[error("No such stream: {0}")]
    Unsatisfiable(String),

    /// The transcoding tool failed to start or exited abnormally.
    #[error("Process error: {0}")]
    Process(String),

    /// The request was aborted by the caller.
    #[error("Download cancelled")]
    Cancelled,

    #[error("Invalid time range: {0}")]
    InvalidTimeRange(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("XML error: {0}")]
    Xml(String),

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse(msg.into())
    }

    pub fn extraction(msg: impl Into<String>) -> Self {
        Self::Extraction(msg.into())
    }

    pub fn unsatisfiable(msg: impl Into<String>) -> Self {
        Self::Unsatisfiable(msg.into())
    }

    pub fn process(msg: impl Into<String>) -> Self {
        Self::Process(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// True when the failure was caused by the caller cancelling the request.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// True for conditions that should be reported to the end user as-is
    /// rather than as an internal fault.
    pub fn is_user_facing(&self) -> bool {
        matches!(
            self,
            Self::Extraction(_) | Self::Unsatisfiable(_) | Self::InvalidTimeRange(_)
        )
    }
}
