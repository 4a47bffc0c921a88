//! Source document supplied by the ingestion side.

use serde::{Deserialize, Serialize};

/// Normalized source novel: metadata plus ordered text segments.
///
/// Created once by a source provider and read-only afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, derive_getters::Getters)]
pub struct SourceDocument {
    /// Identifier of the source (path, archive name, URL)
    identifier: String,
    /// Title of the work
    title: String,
    /// Author, when known
    author: Option<String>,
    /// Ordered text segments (chapters, scenes or paragraphs)
    segments: Vec<String>,
}

impl SourceDocument {
    /// Creates a source document.
    pub fn new(
        identifier: impl Into<String>,
        title: impl Into<String>,
        author: Option<String>,
        segments: Vec<String>,
    ) -> Self {
        Self {
            identifier: identifier.into(),
            title: title.into(),
            author,
            segments,
        }
    }

    /// True when no segment carries any non-whitespace text.
    pub fn is_empty(&self) -> bool {
        self.segments.iter().all(|s| s.trim().is_empty())
    }

    /// Total characters across all segments.
    pub fn char_count(&self) -> usize {
        self.segments.iter().map(|s| s.chars().count()).sum()
    }
}
