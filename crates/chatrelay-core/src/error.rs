use thiserror::Error;

/// A convenience `Result` alias using [`RelayError`].
pub type RelayResult<T> = Result<T, RelayError>;

/// Top-level error type for chatrelay.
///
/// Every variant maps onto one [`ErrorKind`], which is what callers at the
/// transport boundary use to decide how to report the failure.
#[derive(Error, Debug)]
pub enum RelayError {
    /// Bad caller input (e.g. an empty role). Never retried.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Persistence failure in the history store.
    #[error("Store error: {0}")]
    Store(String),

    /// The generation backend failed or timed out. Holds the backend's own
    /// error text.
    #[error("Generation error: {0}")]
    Generation(String),

    /// An outbound HTTP request failed (backend or transport API).
    #[error("HTTP error: {0}")]
    Http(String),

    /// Configuration parsing or validation failed.
    #[error("Config error: {0}")]
    Config(String),

    /// The chat transport failed to deliver or receive a message.
    #[error("Channel error: {0}")]
    Channel(String),

    /// A JSON serialization or deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A standard I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Coarse classification of a [`RelayError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Rejected caller input.
    Validation,
    /// Persistence I/O failure.
    Store,
    /// Backend failure or timeout.
    Generation,
    /// Invalid configuration.
    Config,
    /// Transport failure.
    Channel,
}

impl RelayError {
    /// Classify this error.
    ///
    /// Raw I/O and JSON errors only surface from persistence code paths, so
    /// they count as store failures; raw HTTP errors only surface from
    /// backends and count as generation failures.
    pub fn kind(&self) -> ErrorKind {
        match self {
            RelayError::Validation(_) => ErrorKind::Validation,
            RelayError::Store(_) | RelayError::Json(_) | RelayError::Io(_) => ErrorKind::Store,
            RelayError::Generation(_) | RelayError::Http(_) => ErrorKind::Generation,
            RelayError::Config(_) => ErrorKind::Config,
            RelayError::Channel(_) => ErrorKind::Channel,
        }
    }

    /// Whether retrying the whole operation may succeed.
    ///
    /// Generation and store failures leave session state untouched, so the
    /// caller may resubmit the same turn.
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind(), ErrorKind::Generation | ErrorKind::Store)
    }
}
