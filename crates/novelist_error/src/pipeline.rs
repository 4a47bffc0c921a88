//! Orchestration error types.

use crate::FailureClass;

/// Specific error conditions raised while driving a run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, derive_more::Display)]
pub enum PipelineErrorKind {
    /// Source document could not be read
    #[display("Source unreadable: {_0}")]
    SourceUnreadable(String),
    /// Source document has no usable text
    #[display("Source document '{_0}' contains no text segments")]
    EmptySource(String),
    /// LLM output did not have the expected shape
    #[display("Malformed model output: {_0}")]
    MalformedOutput(String),
    /// Idea generation produced nothing usable
    #[display("No ideas were generated")]
    NoIdeasGenerated,
    /// Phase change would move a run backwards
    #[display("Invalid phase transition from {from} to {to}")]
    InvalidTransition {
        /// Current phase
        from: String,
        /// Requested phase
        to: String,
    },
    /// Run identifier is empty or not path-safe
    #[display("Invalid run id '{_0}'")]
    InvalidRunId(String),
    /// Concept id not known to the run
    #[display("Unknown concept: {_0}")]
    UnknownConcept(String),
    /// Concept cannot be reopened from its current status
    #[display("Concept {concept_id} cannot be restarted while {status}")]
    NotRestartable {
        /// Concept id
        concept_id: String,
        /// Current status
        status: String,
    },
    /// Prompt template referenced an unknown placeholder
    #[display("Template '{template}' has unresolved placeholder {{{placeholder}}}")]
    UnresolvedPlaceholder {
        /// Template name
        template: String,
        /// Placeholder name
        placeholder: String,
    },
    /// Work stopped by run cancellation
    #[display("Run cancelled")]
    Cancelled,
}

impl PipelineErrorKind {
    /// Recovery class for this failure.
    pub fn failure_class(&self) -> FailureClass {
        match self {
            PipelineErrorKind::MalformedOutput(_) => FailureClass::Validation,
            _ => FailureClass::Fatal,
        }
    }
}

/// Error type for orchestration.
///
/// # Examples
///
/// ```
/// use novelist_error::{PipelineError, PipelineErrorKind};
///
/// let err = PipelineError::new(PipelineErrorKind::NoIdeasGenerated);
/// assert!(format!("{}", err).contains("No ideas"));
/// ```
#[derive(Debug, Clone, derive_more::Display, derive_more::Error)]
#[display("Pipeline Error: {} at line {} in {}", kind, line, file)]
pub struct PipelineError {
    /// The specific error condition
    pub kind: PipelineErrorKind,
    /// Line number where the error occurred
    pub line: u32,
    /// Source file where the error occurred
    pub file: &'static str,
}

impl PipelineError {
    /// Create a new PipelineError with automatic location tracking.
    #[track_caller]
    pub fn new(kind: PipelineErrorKind) -> Self {
        let location = std::panic::Location::caller();
        Self {
            kind,
            line: location.line(),
            file: location.file(),
        }
    }
}
