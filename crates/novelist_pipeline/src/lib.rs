//! Orchestration of a Novelist run.
//!
//! A run moves through three phases, each built on the shared
//! [`CompletionClient`]:
//!
//! 1. [`IdeaGenerator`] produces candidate spin-off concepts from the source.
//! 2. [`IdeaEvaluator`] scores them against a rubric and selects the best.
//! 3. [`RefinementEngine`] drives each selected concept through
//!    draft, critique and revision until the critique is satisfied or the
//!    iteration cap is reached.
//!
//! [`RunCoordinator`] sequences the phases, persists the run state at every
//! boundary, and resumes interrupted runs from their last checkpoint.

mod completion;
mod condense;
mod coordinator;
mod evaluation;
mod extraction;
mod ideas;
mod prompts;
mod refinement;

pub use completion::CompletionClient;
pub use condense::{condense_source, source_context};
pub use coordinator::{RunCoordinator, RunReport, RunRequest, RunSummary};
pub use evaluation::{IdeaEvaluator, select_top};
pub use extraction::{
    ConceptCandidate, RUBRIC_CRITERIA, contains_marker, extract_json, parse_concepts, parse_rubric,
};
pub use ideas::IdeaGenerator;
pub use prompts::PromptTemplates;
pub use refinement::RefinementEngine;
