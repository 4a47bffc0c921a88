//! Core data types for the Novelist pipeline.
//!
//! This crate provides the data model shared by every stage of a run:
//! source documents, concepts, scores, manuscript drafts, the durable run
//! state, the generation request types, and configuration.

mod concept;
mod config;
mod draft;
mod message;
mod request;
mod role;
mod run_state;
mod score;
mod source;

pub use concept::{Concept, ConceptId, Provenance, content_fingerprint, normalize_content};
pub use config::{
    LlmConfig, NovelistConfig, PromptOverrides, RateLimitConfig, RetryConfig, RunConfig,
};
pub use draft::{Critique, HistoryRecord, ManuscriptDraft, apply_record, fold_history};
pub use message::Message;
pub use request::{
    CompletionOptions, GenerateRequest, GenerateRequestBuilder, GenerateResponse, TokenUsage,
};
pub use role::Role;
pub use run_state::{ConceptStatus, RunId, RunPhase, RunState};
pub use score::Score;
pub use source::SourceDocument;
