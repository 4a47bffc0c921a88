//! Error types for the Novelist pipeline.
//!
//! Every error records the source location where it was created. Errors from
//! the individual areas (completion calls, storage, configuration, pipeline
//! control) are aggregated into [`NovelistError`].

mod completion;
mod config;
mod pipeline;
mod storage;

pub use completion::{CompletionError, CompletionErrorKind};
pub use config::ConfigError;
pub use pipeline::{PipelineError, PipelineErrorKind};
pub use storage::{StorageError, StorageErrorKind};

/// Recovery class of a failure.
///
/// - `Validation`: malformed prompt or output shape, recovered by regenerating
///   within a bounded number of attempts.
/// - `Transient`: network trouble or rate limiting, recovered by backoff retry.
/// - `Fatal`: credential problems, exhausted retries, malformed source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, derive_more::Display)]
pub enum FailureClass {
    /// Output or prompt shape was unusable
    #[display("validation")]
    Validation,
    /// Temporary failure worth retrying
    #[display("transient")]
    Transient,
    /// Unrecoverable failure
    #[display("fatal")]
    Fatal,
}

/// Trait for errors that support retry logic.
///
/// # Examples
///
/// ```
/// use novelist_error::{CompletionError, CompletionErrorKind, RetryableError};
///
/// let err = CompletionError::new(CompletionErrorKind::Http {
///     status: 503,
///     message: "Service unavailable".to_string(),
/// });
/// assert!(err.is_retryable());
///
/// let err = CompletionError::new(CompletionErrorKind::Unauthorized("bad key".into()));
/// assert!(!err.is_retryable());
/// ```
pub trait RetryableError {
    /// Returns true if this error should trigger a retry.
    fn is_retryable(&self) -> bool;
}

/// Crate-level error variants.
#[derive(Debug, derive_more::From, derive_more::Display)]
pub enum NovelistErrorKind {
    /// Completion endpoint failure
    #[display("{_0}")]
    Completion(CompletionError),
    /// Configuration error
    #[display("{_0}")]
    Config(ConfigError),
    /// Persistence failure
    #[display("{_0}")]
    Storage(StorageError),
    /// Orchestration failure
    #[display("{_0}")]
    Pipeline(PipelineError),
}

/// Novelist error with kind discrimination.
#[derive(Debug)]
pub struct NovelistError(Box<NovelistErrorKind>);

impl NovelistError {
    /// Create a new error from a kind.
    pub fn new(kind: NovelistErrorKind) -> Self {
        Self(Box::new(kind))
    }

    /// Get the error kind.
    pub fn kind(&self) -> &NovelistErrorKind {
        &self.0
    }

    /// Recovery class of the underlying failure.
    pub fn failure_class(&self) -> FailureClass {
        match self.kind() {
            NovelistErrorKind::Completion(e) => e.kind.failure_class(),
            NovelistErrorKind::Pipeline(e) => e.kind.failure_class(),
            NovelistErrorKind::Config(_) | NovelistErrorKind::Storage(_) => FailureClass::Fatal,
        }
    }

    /// True when the failure was caused by run cancellation.
    pub fn is_cancelled(&self) -> bool {
        match self.kind() {
            NovelistErrorKind::Completion(e) => e.kind == CompletionErrorKind::Cancelled,
            NovelistErrorKind::Pipeline(e) => e.kind == PipelineErrorKind::Cancelled,
            _ => false,
        }
    }
}

impl std::fmt::Display for NovelistError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Novelist Error: {}", self.0)
    }
}

impl std::error::Error for NovelistError {}

// Generic From implementation for any type that converts to NovelistErrorKind
impl<T> From<T> for NovelistError
where
    T: Into<NovelistErrorKind>,
{
    fn from(err: T) -> Self {
        Self::new(err.into())
    }
}

/// Result type for Novelist operations.
pub type NovelistResult<T> = std::result::Result<T, NovelistError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_class_propagates_through_wrapper() {
        let err: NovelistError = CompletionError::new(CompletionErrorKind::Timeout(
            "30s elapsed".to_string(),
        ))
        .into();
        assert_eq!(err.failure_class(), FailureClass::Transient);

        let err: NovelistError =
            PipelineError::new(PipelineErrorKind::MalformedOutput("no json".into())).into();
        assert_eq!(err.failure_class(), FailureClass::Validation);

        let err: NovelistError = ConfigError::new("workers must be positive").into();
        assert_eq!(err.failure_class(), FailureClass::Fatal);
    }

    #[test]
    fn test_cancellation_detection() {
        let err: NovelistError = CompletionError::new(CompletionErrorKind::Cancelled).into();
        assert!(err.is_cancelled());

        let err: NovelistError = PipelineError::new(PipelineErrorKind::NoIdeasGenerated).into();
        assert!(!err.is_cancelled());
    }

    #[test]
    fn test_display_includes_location() {
        let err: NovelistError = StorageError::new(StorageErrorKind::NotFound(
            "runs/abc/run_state.json".into(),
        ))
        .into();
        let text = err.to_string();
        assert!(text.starts_with("Novelist Error: Storage Error: Not found"));
        assert!(text.contains("lib.rs"));
    }
}
