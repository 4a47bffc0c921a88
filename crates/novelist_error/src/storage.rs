//! Storage error types.

/// Kinds of storage errors.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, derive_more::Display)]
pub enum StorageErrorKind {
    /// Record not found at the specified location
    #[display("Not found: {}", _0)]
    NotFound(String),
    /// I/O error during storage operation
    #[display("I/O error: {}", _0)]
    Io(String),
    /// Record could not be encoded or decoded
    #[display("Serialization error: {}", _0)]
    Serialization(String),
    /// Draft appended out of order
    #[display(
        "Draft iteration gap for concept {}: expected {}, got {}",
        concept_id,
        expected,
        actual
    )]
    IterationGap {
        /// Concept whose history was being extended
        concept_id: String,
        /// Next iteration index the history accepts
        expected: u32,
        /// Iteration index that was offered
        actual: u32,
    },
    /// Critique recorded for a draft that does not exist
    #[display("No draft {} recorded for concept {}", iteration, concept_id)]
    MissingDraft {
        /// Concept whose history was being extended
        concept_id: String,
        /// Iteration the critique refers to
        iteration: u32,
    },
    /// Generic storage error with message
    #[display("{}", _0)]
    Other(String),
}

/// Storage error with location tracking.
///
/// # Examples
///
/// ```
/// use novelist_error::{StorageError, StorageErrorKind};
///
/// let err = StorageError::new(StorageErrorKind::NotFound("/path/to/run".to_string()));
/// assert!(format!("{}", err).contains("Not found"));
/// ```
#[derive(Debug, Clone, derive_more::Display, derive_more::Error)]
#[display("Storage Error: {} at line {} in {}", kind, line, file)]
pub struct StorageError {
    /// The kind of error that occurred
    pub kind: StorageErrorKind,
    /// Line number where error was created
    pub line: u32,
    /// File where error was created
    pub file: &'static str,
}

impl StorageError {
    /// Create a new storage error with automatic location tracking.
    #[track_caller]
    pub fn new(kind: StorageErrorKind) -> Self {
        let location = std::panic::Location::caller();
        Self {
            kind,
            line: location.line(),
            file: location.file(),
        }
    }
}
