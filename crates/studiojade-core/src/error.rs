use thiserror::Error;

/// Errors produced while fetching the roster from the upstream API.
///
/// Every variant except [`FetchError::Client`] is retryable; the fetcher wraps
/// the last one in [`FetchError::Exhausted`] once it runs out of attempts.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Connection, TLS or timeout failure.
    #[error("Network error: {0}")]
    Network(String),

    /// The upstream answered with a non-success status code.
    #[error("HTTP error: status {0}")]
    Status(u16),

    /// The body was not the expected JSON document.
    #[error("Failed to decode roster: {0}")]
    Decode(String),

    /// The HTTP client could not be constructed.
    #[error("HTTP client error: {0}")]
    Client(String),

    /// All attempts failed; carries the last underlying error.
    #[error("Roster fetch failed after {attempts} attempts: {last}")]
    Exhausted {
        attempts: u32,
        #[source]
        last: Box<FetchError>,
    },
}

impl FetchError {
    /// Whether another attempt could succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Status(_) | Self::Decode(_))
    }

    /// The innermost error, skipping the `Exhausted` wrapper.
    pub fn root(&self) -> &FetchError {
        match self {
            Self::Exhausted { last, .. } => last.root(),
            other => other,
        }
    }
}

/// Rejections for client telemetry payloads.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Request body is not valid JSON: {0}")]
    NotJson(String),

    #[error("Content-Type must be application/json")]
    UnsupportedMediaType,

    #[error("Payload contains no recognised metrics")]
    EmptyPayload,

    #[error("Invalid value for '{field}': {reason}")]
    InvalidField { field: String, reason: String },

    #[error("Request body is too large: {0}")]
    PayloadTooLarge(String),

    #[error("Request body could not be read: {0}")]
    BodyUnreadable(String),
}

impl ValidationError {
    pub fn invalid_field(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidField {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Top-level error for core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("URL parsing error: {0}")]
    UrlError(#[from] url::ParseError),
}

impl CoreError {
    /// Create a new Configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Get error category for logging
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Fetch(FetchError::Client(_)) => ErrorCategory::System,
            Self::Fetch(_) => ErrorCategory::Upstream,
            Self::Validation(_) => ErrorCategory::Validation,
            Self::Configuration(_) | Self::UrlError(_) => ErrorCategory::Configuration,
        }
    }
}

/// Error categories for logging and classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Upstream,
    Validation,
    System,
    Configuration,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Upstream => write!(f, "upstream"),
            Self::Validation => write!(f, "validation"),
            Self::System => write!(f, "system"),
            Self::Configuration => write!(f, "configuration"),
        }
    }
}

/// Convenience result type for core operations
pub type Result<T> = std::result::Result<T, CoreError>;
