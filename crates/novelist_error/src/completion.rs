//! Completion endpoint error types and failure classification.

use crate::{FailureClass, RetryableError};

/// Failure conditions reported by a completion call.
#[derive(Debug, Clone, PartialEq, Eq, Hash, derive_more::Display)]
pub enum CompletionErrorKind {
    /// Provider asked us to slow down
    #[display("Rate limited by provider: {_0}")]
    RateLimited(String),
    /// Request did not finish in time
    #[display("Request timed out: {_0}")]
    Timeout(String),
    /// Connection-level failure
    #[display("Network failure: {_0}")]
    Network(String),
    /// Non-success HTTP status
    #[display("HTTP {status} error: {message}")]
    Http {
        /// HTTP status code
        status: u16,
        /// Response body or reason
        message: String,
    },
    /// Response body could not be interpreted
    #[display("Malformed response: {_0}")]
    MalformedResponse(String),
    /// API credential missing from the environment
    #[display("Credential environment variable {_0} is not set")]
    MissingCredential(String),
    /// API credential rejected by the provider
    #[display("Credential rejected: {_0}")]
    Unauthorized(String),
    /// Prompt exceeds the configured bound
    #[display("Prompt is {len} characters, limit is {max}")]
    PromptTooLong {
        /// Prompt length in characters
        len: usize,
        /// Configured maximum
        max: usize,
    },
    /// Every retry attempt failed
    #[display("Retries exhausted after {attempts} attempts: {last}")]
    RetriesExhausted {
        /// Number of attempts made
        attempts: usize,
        /// Description of the last failure
        last: String,
    },
    /// Local rate limiter could not grant a permit
    #[display("Rate limiter unavailable: {_0}")]
    Limiter(String),
    /// Run-level cancellation interrupted the call
    #[display("Completion cancelled")]
    Cancelled,
}

impl CompletionErrorKind {
    /// Recovery class for this failure.
    pub fn failure_class(&self) -> FailureClass {
        match self {
            CompletionErrorKind::RateLimited(_)
            | CompletionErrorKind::Timeout(_)
            | CompletionErrorKind::Network(_)
            | CompletionErrorKind::MalformedResponse(_) => FailureClass::Transient,
            CompletionErrorKind::Http { status, .. } => {
                if matches!(*status, 408 | 429 | 500 | 502 | 503 | 504) {
                    FailureClass::Transient
                } else {
                    FailureClass::Fatal
                }
            }
            CompletionErrorKind::PromptTooLong { .. } => FailureClass::Validation,
            CompletionErrorKind::MissingCredential(_)
            | CompletionErrorKind::Unauthorized(_)
            | CompletionErrorKind::RetriesExhausted { .. }
            | CompletionErrorKind::Limiter(_)
            | CompletionErrorKind::Cancelled => FailureClass::Fatal,
        }
    }
}

/// Completion error with source location tracking.
///
/// # Examples
///
/// ```
/// use novelist_error::{CompletionError, CompletionErrorKind, FailureClass};
///
/// let err = CompletionError::new(CompletionErrorKind::MissingCredential(
///     "NOVELIST_API_KEY".to_string(),
/// ));
/// assert_eq!(err.kind.failure_class(), FailureClass::Fatal);
/// assert!(format!("{}", err).contains("NOVELIST_API_KEY"));
/// ```
#[derive(Debug, Clone, derive_more::Display, derive_more::Error)]
#[display("Completion Error: {} at line {} in {}", kind, line, file)]
pub struct CompletionError {
    /// The kind of error that occurred
    pub kind: CompletionErrorKind,
    /// Line number where error was created
    pub line: u32,
    /// File where error was created
    pub file: &'static str,
}

impl CompletionError {
    /// Create a new CompletionError with automatic location tracking.
    #[track_caller]
    pub fn new(kind: CompletionErrorKind) -> Self {
        let location = std::panic::Location::caller();
        Self {
            kind,
            line: location.line(),
            file: location.file(),
        }
    }
}

impl RetryableError for CompletionError {
    fn is_retryable(&self) -> bool {
        self.kind.failure_class() == FailureClass::Transient
    }
}
