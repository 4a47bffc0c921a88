//! Durable run storage trait.

use async_trait::async_trait;
use novelist_core::{Concept, ConceptId, HistoryRecord, ManuscriptDraft, RunId, RunState, Score};
use novelist_error::NovelistResult;

/// Persistence for run state, concepts, scores and draft histories.
///
/// Histories are append-only. `append_history` must reject records that
/// would leave a gap in a concept's iteration sequence and must be durable
/// when it returns, so a crash never loses an acknowledged draft. Appends
/// for one concept are serialized; appends for different concepts may run
/// concurrently.
#[async_trait]
pub trait RunStore: Send + Sync {
    /// Load the run state, or `None` when the run does not exist.
    async fn load_state(&self, run_id: &RunId) -> NovelistResult<Option<RunState>>;

    /// Replace the stored run state.
    async fn save_state(&self, state: &RunState) -> NovelistResult<()>;

    /// Replace the stored concepts of a run.
    async fn save_concepts(&self, run_id: &RunId, concepts: &[Concept]) -> NovelistResult<()>;

    /// Load the concepts of a run, in generation order.
    async fn load_concepts(&self, run_id: &RunId) -> NovelistResult<Vec<Concept>>;

    /// Replace the stored scores of a run.
    async fn save_scores(&self, run_id: &RunId, scores: &[Score]) -> NovelistResult<()>;

    /// Load the scores of a run.
    async fn load_scores(&self, run_id: &RunId) -> NovelistResult<Vec<Score>>;

    /// Durably append one record to a concept's history.
    async fn append_history(&self, run_id: &RunId, record: &HistoryRecord) -> NovelistResult<()>;

    /// Load a concept's drafts with their critiques, oldest first.
    async fn load_history(
        &self,
        run_id: &RunId,
        concept_id: ConceptId,
    ) -> NovelistResult<Vec<ManuscriptDraft>>;

    /// Write the final manuscript of a finished concept.
    async fn export_manuscript(
        &self,
        run_id: &RunId,
        concept_id: ConceptId,
        text: &str,
    ) -> NovelistResult<()>;
}
