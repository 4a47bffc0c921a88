//! Novelist: spin-off novel generation driven by an LLM.
//!
//! A run takes a source novel through three phases:
//!
//! 1. **Idea generation** asks the model for distinct spin-off concepts.
//! 2. **Evaluation** scores each concept on a rubric and keeps the best.
//! 3. **Refinement** drafts a manuscript per concept, then alternates
//!    critique and revision until the critique is satisfied or the iteration
//!    cap is reached.
//!
//! State is checkpointed to disk throughout, so interrupted runs resume where
//! they stopped.
//!
//! # Example
//!
//! ```rust,ignore
//! use novelist::{
//!     FileRunStore, NovelistConfig, OpenAICompatibleClient, RunCoordinator, RunId, RunRequest,
//!     TextFileSource,
//! };
//! use std::sync::Arc;
//!
//! let config = NovelistConfig::load(None)?;
//! let driver = Arc::new(OpenAICompatibleClient::from_env(&config.llm)?);
//! let store = Arc::new(FileRunStore::new(&config.run.state_dir));
//! let coordinator = RunCoordinator::new(driver, Arc::new(TextFileSource::new()), store);
//!
//! let summary = coordinator
//!     .run(RunRequest::new(RunId::generate(), "melos.txt", config))
//!     .await?;
//! println!("{} manuscripts written", summary.completed.len());
//! ```

pub mod cli;

pub use novelist_core::{
    Concept, ConceptId, ConceptStatus, ManuscriptDraft, NovelistConfig, RunId, RunPhase, RunState,
    Score, SourceDocument,
};
pub use novelist_error::{FailureClass, NovelistError, NovelistErrorKind, NovelistResult};
pub use novelist_interface::{CompletionDriver, RunStore, SourceProvider};
pub use novelist_models::OpenAICompatibleClient;
pub use novelist_pipeline::{
    CompletionClient, PromptTemplates, RunCoordinator, RunReport, RunRequest, RunSummary,
};
pub use novelist_rate_limit::RateLimiter;
pub use novelist_storage::{FileRunStore, InMemoryRunStore, TextFileSource};
