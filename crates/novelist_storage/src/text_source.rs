//! Plain-text source provider.

use async_trait::async_trait;
use novelist_core::SourceDocument;
use novelist_error::{NovelistResult, PipelineError, PipelineErrorKind};
use novelist_interface::SourceProvider;
use std::path::Path;
use tracing::{debug, instrument};

/// Loads a novel from a UTF-8 text file.
///
/// Invalid byte sequences are replaced rather than rejected. The title falls
/// back to the file stem when none is configured.
#[derive(Debug, Clone, Default)]
pub struct TextFileSource {
    title: Option<String>,
    author: Option<String>,
}

impl TextFileSource {
    /// Source without explicit metadata.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the title reported for the document.
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Sets the author reported for the document.
    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }
}

/// Splits text into paragraph segments separated by blank lines.
///
/// Text without blank lines is split per line instead. Segments are trimmed
/// and empty ones dropped.
pub fn split_segments(text: &str) -> Vec<String> {
    let normalized = text.replace("\r\n", "\n");
    let mut segments: Vec<String> = Vec::new();
    let mut current: Vec<&str> = Vec::new();

    for line in normalized.lines() {
        if line.trim().is_empty() {
            if !current.is_empty() {
                segments.push(current.join("\n").trim().to_string());
                current.clear();
            }
        } else {
            current.push(line);
        }
    }
    if !current.is_empty() {
        segments.push(current.join("\n").trim().to_string());
    }

    if segments.len() == 1 {
        let lines: Vec<String> = segments[0]
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect();
        if lines.len() > 1 {
            return lines;
        }
    }
    segments
}

#[async_trait]
impl SourceProvider for TextFileSource {
    #[instrument(skip(self))]
    async fn load(&self, identifier: &str) -> NovelistResult<SourceDocument> {
        let path = Path::new(identifier);
        let bytes = tokio::fs::read(path).await.map_err(|e| {
            PipelineError::new(PipelineErrorKind::SourceUnreadable(format!(
                "{}: {}",
                identifier, e
            )))
        })?;
        let text = String::from_utf8_lossy(&bytes);
        let segments = split_segments(&text);

        let title = self.title.clone().unwrap_or_else(|| {
            path.file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
                .unwrap_or_else(|| identifier.to_string())
        });
        let document = SourceDocument::new(identifier, title, self.author.clone(), segments);

        if document.is_empty() {
            return Err(PipelineError::new(PipelineErrorKind::EmptySource(identifier.to_string())).into());
        }

        debug!(
            segments = document.segments().len(),
            chars = document.char_count(),
            "Loaded source document"
        );
        Ok(document)
    }
}
