use thiserror::Error;

/// Errors from a tracker announce attempt.
#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("tracker unreachable: {0}")]
    Unreachable(String),

    /// The tracker answered with a failure reason.
    #[error("tracker failure: {0}")]
    Failure(String),

    #[error("invalid tracker response: {0}")]
    InvalidResponse(&'static str),

    #[error("unsupported tracker url: {0}")]
    UnsupportedUrl(String),
}
