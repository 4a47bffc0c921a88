//! In-memory run store.
//!
//! Holds everything in maps behind an async lock. Enforces the same history
//! invariants as the file store, which makes it the store of choice for
//! pipeline tests. All data is lost when the store is dropped.

use async_trait::async_trait;
use novelist_core::{
    Concept, ConceptId, HistoryRecord, ManuscriptDraft, RunId, RunState, Score, apply_record,
};
use novelist_error::NovelistResult;
use novelist_interface::RunStore;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Clone, Default)]
struct StoredRun {
    state: Option<RunState>,
    concepts: Vec<Concept>,
    scores: Vec<Score>,
    histories: HashMap<ConceptId, Vec<ManuscriptDraft>>,
    manuscripts: HashMap<ConceptId, String>,
    state_saves: usize,
}

/// Run store backed by memory.
///
/// Clones share the same underlying data.
#[derive(Debug, Clone, Default)]
pub struct InMemoryRunStore {
    runs: Arc<RwLock<HashMap<RunId, StoredRun>>>,
}

impl InMemoryRunStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Exported manuscript of a concept, if any.
    pub async fn manuscript(&self, run_id: &RunId, concept_id: ConceptId) -> Option<String> {
        self.runs
            .read()
            .await
            .get(run_id)
            .and_then(|run| run.manuscripts.get(&concept_id).cloned())
    }

    /// Number of times the run state was saved.
    pub async fn state_saves(&self, run_id: &RunId) -> usize {
        self.runs
            .read()
            .await
            .get(run_id)
            .map(|run| run.state_saves)
            .unwrap_or(0)
    }
}

#[async_trait]
impl RunStore for InMemoryRunStore {
    async fn load_state(&self, run_id: &RunId) -> NovelistResult<Option<RunState>> {
        Ok(self
            .runs
            .read()
            .await
            .get(run_id)
            .and_then(|run| run.state.clone()))
    }

    async fn save_state(&self, state: &RunState) -> NovelistResult<()> {
        let mut runs = self.runs.write().await;
        let run = runs.entry(state.run_id().clone()).or_default();
        run.state = Some(state.clone());
        run.state_saves += 1;
        Ok(())
    }

    async fn save_concepts(&self, run_id: &RunId, concepts: &[Concept]) -> NovelistResult<()> {
        self.runs
            .write()
            .await
            .entry(run_id.clone())
            .or_default()
            .concepts = concepts.to_vec();
        Ok(())
    }

    async fn load_concepts(&self, run_id: &RunId) -> NovelistResult<Vec<Concept>> {
        Ok(self
            .runs
            .read()
            .await
            .get(run_id)
            .map(|run| run.concepts.clone())
            .unwrap_or_default())
    }

    async fn save_scores(&self, run_id: &RunId, scores: &[Score]) -> NovelistResult<()> {
        self.runs
            .write()
            .await
            .entry(run_id.clone())
            .or_default()
            .scores = scores.to_vec();
        Ok(())
    }

    async fn load_scores(&self, run_id: &RunId) -> NovelistResult<Vec<Score>> {
        Ok(self
            .runs
            .read()
            .await
            .get(run_id)
            .map(|run| run.scores.clone())
            .unwrap_or_default())
    }

    async fn append_history(&self, run_id: &RunId, record: &HistoryRecord) -> NovelistResult<()> {
        let mut runs = self.runs.write().await;
        let drafts = runs
            .entry(run_id.clone())
            .or_default()
            .histories
            .entry(record.concept_id())
            .or_default();

        // Validate on a copy so a rejected record leaves the history intact
        let mut updated = drafts.clone();
        apply_record(&mut updated, record.clone())?;
        *drafts = updated;
        Ok(())
    }

    async fn load_history(
        &self,
        run_id: &RunId,
        concept_id: ConceptId,
    ) -> NovelistResult<Vec<ManuscriptDraft>> {
        Ok(self
            .runs
            .read()
            .await
            .get(run_id)
            .and_then(|run| run.histories.get(&concept_id).cloned())
            .unwrap_or_default())
    }

    async fn export_manuscript(
        &self,
        run_id: &RunId,
        concept_id: ConceptId,
        text: &str,
    ) -> NovelistResult<()> {
        self.runs
            .write()
            .await
            .entry(run_id.clone())
            .or_default()
            .manuscripts
            .insert(concept_id, text.to_string());
        Ok(())
    }
}
