//! Source provider trait.

use async_trait::async_trait;
use novelist_core::SourceDocument;
use novelist_error::NovelistResult;

/// Supplies the normalized source novel.
///
/// Loading has no side effects the pipeline needs to manage; an unreadable
/// or empty source is reported as an error.
#[async_trait]
pub trait SourceProvider: Send + Sync {
    /// Load the document named by `identifier`.
    async fn load(&self, identifier: &str) -> NovelistResult<SourceDocument>;
}
