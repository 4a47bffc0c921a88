//! Draft, critique and revision loop for a single concept.

use crate::extraction::contains_marker;
use crate::{CompletionClient, PromptTemplates};
use novelist_core::{
    Concept, ConceptStatus, Critique, HistoryRecord, ManuscriptDraft, RunConfig, RunId,
    apply_record,
};
use novelist_error::{NovelistResult, PipelineError, PipelineErrorKind};
use novelist_interface::RunStore;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

/// Next step of a concept, derived from its persisted history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Draft,
    Critique,
    Revise,
    Done,
}

/// Drives concepts through draft, critique and revision.
///
/// The persisted history is the only state: the next step is always derived
/// from the last durable draft and whether it carries a critique. Every draft
/// and critique is appended to the store before the loop advances, so an
/// interrupted concept resumes at its last completed step.
///
/// A concept is done when a critique contains the done marker or when the
/// latest draft is the last one `max_iterations` allows. Clones share the
/// client and store.
#[derive(Clone)]
pub struct RefinementEngine {
    client: CompletionClient,
    templates: Arc<PromptTemplates>,
    store: Arc<dyn RunStore>,
    run_id: RunId,
    title: Arc<str>,
    source: Arc<str>,
    max_iterations: u32,
    validation_retries: u32,
    done_marker: String,
    temperature: f32,
}

impl std::fmt::Debug for RefinementEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefinementEngine")
            .field("run_id", &self.run_id)
            .field("max_iterations", &self.max_iterations)
            .field("done_marker", &self.done_marker)
            .finish()
    }
}

impl RefinementEngine {
    /// Engine writing to `store` under `run_id`.
    ///
    /// `source` is the source text block placed in first-draft prompts.
    pub fn new(
        client: CompletionClient,
        templates: Arc<PromptTemplates>,
        store: Arc<dyn RunStore>,
        run_id: RunId,
        run: &RunConfig,
        title: impl Into<String>,
        source: impl Into<String>,
    ) -> Self {
        Self {
            client,
            templates,
            store,
            run_id,
            title: Arc::from(title.into()),
            source: Arc::from(source.into()),
            max_iterations: run.max_iterations.max(1),
            validation_retries: run.validation_retries,
            done_marker: run.done_marker.clone(),
            temperature: run.drafting_temperature,
        }
    }

    /// True when `critique` signals that no further changes are needed.
    pub fn is_resolved(&self, critique: &str) -> bool {
        contains_marker(critique, &self.done_marker)
    }

    fn next_step(&self, history: &[ManuscriptDraft]) -> Step {
        let Some(latest) = history.last() else {
            return Step::Draft;
        };
        let last_allowed = latest.iteration() + 1 >= self.max_iterations;
        match latest.critique() {
            Some(critique) if *critique.resolved() => Step::Done,
            _ if last_allowed => Step::Done,
            None => Step::Critique,
            Some(_) => Step::Revise,
        }
    }

    /// Refines `concept` to a terminal or paused status.
    ///
    /// Never fails: cancellation yields `Paused`, any other error `Failed`.
    #[instrument(skip(self, concept), fields(run_id = %self.run_id, concept_id = %concept.id()))]
    pub async fn refine(&self, concept: &Concept) -> ConceptStatus {
        match self.drive(concept).await {
            Ok(drafts) => {
                info!(drafts, "Concept refined");
                ConceptStatus::Done
            }
            Err(err) if err.is_cancelled() => {
                info!("Refinement paused");
                ConceptStatus::Paused
            }
            Err(err) => {
                error!(error = %err, "Refinement failed");
                ConceptStatus::Failed {
                    reason: err.to_string(),
                }
            }
        }
    }

    async fn drive(&self, concept: &Concept) -> NovelistResult<usize> {
        let id = *concept.id();
        let concept_block = concept.to_prompt_block();
        let mut history = self.store.load_history(&self.run_id, id).await?;
        if !history.is_empty() {
            debug!(drafts = history.len(), "Resuming from stored history");
        }

        loop {
            if self.client.token().is_cancelled() {
                return Err(PipelineError::new(PipelineErrorKind::Cancelled).into());
            }

            let record = match (self.next_step(&history), history.last()) {
                (Step::Done, Some(latest)) => {
                    self.store
                        .export_manuscript(&self.run_id, id, latest.text())
                        .await?;
                    return Ok(history.len());
                }
                (Step::Critique, Some(latest)) => {
                    let iteration = *latest.iteration();
                    let prompt = self.templates.critique(
                        &concept_block,
                        latest.text(),
                        iteration,
                        self.max_iterations,
                        &self.done_marker,
                    )?;
                    let text = self.generate("critique", &prompt).await?;
                    let resolved = self.is_resolved(&text);
                    debug!(iteration, resolved, "Critique received");
                    HistoryRecord::critique(id, iteration, &Critique::new(text, resolved))
                }
                (Step::Revise, Some(latest)) => {
                    let critique = latest
                        .critique()
                        .as_ref()
                        .map(|c| c.text().as_str())
                        .unwrap_or_default();
                    let prompt = self
                        .templates
                        .revise(&concept_block, latest.text(), critique)?;
                    let iteration = latest.iteration() + 1;
                    let text = self.generate("revise", &prompt).await?;
                    debug!(iteration, "Revision drafted");
                    ManuscriptDraft::new(id, iteration, text).to_record()
                }
                _ => {
                    let prompt = self
                        .templates
                        .draft(&self.title, &self.source, &concept_block)?;
                    let text = self.generate("draft", &prompt).await?;
                    debug!(iteration = 0, "First draft written");
                    ManuscriptDraft::new(id, 0, text).to_record()
                }
            };

            self.store.append_history(&self.run_id, &record).await?;
            apply_record(&mut history, record)?;
        }
    }

    /// Completes `prompt`, regenerating empty responses within the
    /// validation budget.
    async fn generate(&self, label: &str, prompt: &str) -> NovelistResult<String> {
        let options = self.client.options(self.temperature);
        for attempt in 0..=self.validation_retries {
            let text = self.client.complete(label, prompt, &options).await?;
            if !text.trim().is_empty() {
                return Ok(text);
            }
            warn!(label, attempt, "Empty response, regenerating");
        }
        Err(PipelineError::new(PipelineErrorKind::MalformedOutput(format!(
            "empty {} response after {} attempts",
            label,
            self.validation_retries + 1
        )))
        .into())
    }
}
