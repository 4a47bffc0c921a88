//! Concept scoring and selection.

use crate::extraction::{extract_json, parse_rubric};
use crate::{CompletionClient, PromptTemplates};
use futures::stream::{self, StreamExt, TryStreamExt};
use novelist_core::{Concept, RunConfig, Score};
use novelist_error::{CompletionErrorKind, NovelistError, NovelistErrorKind, NovelistResult};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Scores concepts against the rubric prompt.
#[derive(Debug, Clone)]
pub struct IdeaEvaluator {
    client: CompletionClient,
    templates: Arc<PromptTemplates>,
    title: String,
    workers: usize,
    validation_retries: u32,
    temperature: f32,
}

/// Failures that leave a single concept unscored instead of stopping the run.
fn degrades_to_unscored(err: &NovelistError) -> bool {
    matches!(
        err.kind(),
        NovelistErrorKind::Completion(e) if matches!(
            e.kind,
            CompletionErrorKind::RetriesExhausted { .. } | CompletionErrorKind::PromptTooLong { .. }
        )
    )
}

impl IdeaEvaluator {
    /// Evaluator for concepts spun off `title`.
    pub fn new(
        client: CompletionClient,
        templates: Arc<PromptTemplates>,
        title: impl Into<String>,
        run: &RunConfig,
    ) -> Self {
        Self {
            client,
            templates,
            title: title.into(),
            workers: run.workers.max(1),
            validation_retries: run.validation_retries,
            temperature: run.evaluation_temperature,
        }
    }

    /// Scores every concept, preserving input order.
    ///
    /// A response without a usable rubric is regenerated up to the validation
    /// retry budget; after that, or when retries are exhausted, the concept
    /// is kept with an unscored rating of 0.
    ///
    /// # Errors
    ///
    /// Cancellation, credential and template failures stop the evaluation.
    #[instrument(skip(self, concepts), fields(concepts = concepts.len()))]
    pub async fn evaluate(&self, concepts: &[Concept]) -> NovelistResult<Vec<(Concept, Score)>> {
        let scored: Vec<(Concept, Score)> = stream::iter(concepts.iter().cloned())
            .map(|concept| async move {
                let score = self.score(&concept).await?;
                Ok::<_, NovelistError>((concept, score))
            })
            .buffered(self.workers)
            .try_collect()
            .await?;

        info!(scored = scored.len(), "Evaluated concepts");
        Ok(scored)
    }

    async fn score(&self, concept: &Concept) -> NovelistResult<Score> {
        let id = *concept.id();
        let prompt = self
            .templates
            .evaluation(&self.title, &concept.to_prompt_block())?;
        let options = self.client.options(self.temperature);

        for attempt in 0..=self.validation_retries {
            let text = match self.client.complete("evaluation", &prompt, &options).await {
                Ok(text) => text,
                Err(err) => {
                    let err = NovelistError::from(err);
                    if degrades_to_unscored(&err) {
                        warn!(concept_id = %id, error = %err, "Leaving concept unscored");
                        return Ok(Score::unscored(id, err.to_string()));
                    }
                    return Err(err);
                }
            };

            if let Some((criteria, rationale)) = extract_json(&text).as_ref().and_then(parse_rubric)
            {
                let score = Score::from_criteria(id, criteria, rationale);
                debug!(concept_id = %id, rating = score.rating(), "Scored concept");
                return Ok(score);
            }
            warn!(concept_id = %id, attempt, "Unparseable rubric, regenerating");
        }

        warn!(concept_id = %id, "No usable rubric after retries");
        Ok(Score::unscored(id, "no parseable rubric"))
    }
}

/// The `k` best concepts, highest rating first.
///
/// Ties go to the concept generated first. When `k` exceeds the number of
/// concepts all of them are returned.
pub fn select_top(scored: &[(Concept, Score)], k: usize) -> Vec<Concept> {
    let mut ranked: Vec<&(Concept, Score)> = scored.iter().collect();
    ranked.sort_by(|(a, a_score), (b, b_score)| {
        b_score
            .rating()
            .total_cmp(a_score.rating())
            .then_with(|| a.id().cmp(b.id()))
    });
    ranked
        .into_iter()
        .take(k)
        .map(|(concept, _)| concept.clone())
        .collect()
}
