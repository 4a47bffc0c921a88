//! Spin-off concept generation.

use crate::condense::source_context;
use crate::extraction::{ConceptCandidate, contains_marker, extract_json, parse_concepts};
use crate::{CompletionClient, PromptTemplates};
use novelist_core::{
    CompletionOptions, Concept, ConceptId, Provenance, RunConfig, SourceDocument,
    content_fingerprint,
};
use novelist_error::{NovelistError, NovelistResult, PipelineError, PipelineErrorKind};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Requests spin-off concepts until enough usable ones are collected.
///
/// Each round asks only for the missing count and lists everything accepted
/// so far (plus any seed concepts) so the model heads in new directions.
/// Concepts are deduplicated by normalized setting and plot, and ids are
/// allocated in acceptance order starting at 1.
///
/// With more than one reflection pass configured, every accepted concept is
/// sent back for improvement until the model repeats it with the done marker
/// or the passes run out.
#[derive(Debug, Clone)]
pub struct IdeaGenerator {
    client: CompletionClient,
    templates: Arc<PromptTemplates>,
    extra_rounds: u32,
    reflections: u32,
    done_marker: String,
    condense_chars: usize,
    temperature: f32,
    seeds: Vec<Value>,
    summary: Option<String>,
}

impl IdeaGenerator {
    /// Generator using the run's round budget, source budget and temperature.
    pub fn new(client: CompletionClient, templates: Arc<PromptTemplates>, run: &RunConfig) -> Self {
        Self {
            client,
            templates,
            extra_rounds: run.extra_idea_rounds,
            reflections: run.idea_reflections.max(1),
            done_marker: run.done_marker.clone(),
            condense_chars: run.condense_chars,
            temperature: run.idea_temperature,
            seeds: Vec::new(),
            summary: None,
        }
    }

    /// Example concepts shown to the model as directions to avoid.
    pub fn with_seeds(mut self, seeds: Vec<Value>) -> Self {
        self.seeds = seeds;
        self
    }

    /// Source summary included ahead of the excerpts.
    pub fn with_summary(mut self, summary: Option<String>) -> Self {
        self.summary = summary;
        self
    }

    fn previous_block(&self, accepted: &[Concept]) -> String {
        let mut entries: Vec<String> = self
            .seeds
            .iter()
            .map(|seed| serde_json::to_string_pretty(seed).unwrap_or_else(|_| seed.to_string()))
            .collect();
        entries.extend(accepted.iter().map(Concept::to_prompt_block));
        if entries.is_empty() {
            "(none yet)".to_string()
        } else {
            entries.join("\n\n")
        }
    }

    /// Improves `candidate` over the remaining reflection passes.
    ///
    /// Stops early when the response carries the done marker. A failed or
    /// unparseable pass keeps the latest usable version.
    async fn reflect(
        &self,
        title: &str,
        candidate: &ConceptCandidate,
        options: &CompletionOptions,
    ) -> NovelistResult<ConceptCandidate> {
        let mut current = candidate.clone();
        for round in 2..=self.reflections {
            let concept = serde_json::to_string_pretty(&current.to_json())
                .unwrap_or_else(|_| current.to_json().to_string());
            let prompt = self.templates.idea_reflection(
                title,
                &concept,
                round,
                self.reflections,
                &self.done_marker,
            )?;
            let text = match self.client.complete("idea_reflection", &prompt, options).await {
                Ok(text) => text,
                Err(err) => {
                    let err = NovelistError::from(err);
                    if err.is_cancelled() {
                        return Err(err);
                    }
                    warn!(round, error = %err, "Reflection failed, keeping current concept");
                    break;
                }
            };

            match extract_json(&text).and_then(|value| parse_concepts(&value).into_iter().next()) {
                Some(mut improved) => {
                    if improved.name.is_empty() {
                        improved.name = current.name.clone();
                    }
                    current = improved;
                }
                None => warn!(round, "Reflection contained no usable concept"),
            }
            if contains_marker(&text, &self.done_marker) {
                debug!(round, name = %current.name, "Concept converged");
                break;
            }
        }
        Ok(current)
    }

    /// Generates up to `count` distinct concepts for `source`.
    ///
    /// Returns fewer than `count` concepts when the extra rounds run out, with
    /// a warning. A request that fails after some concepts were accepted ends
    /// generation with the concepts obtained so far.
    ///
    /// # Errors
    ///
    /// Cancellation is returned as it is, and so is any completion failure
    /// before a concept was accepted. `NoIdeasGenerated` is returned when no
    /// usable concept was obtained at all.
    #[instrument(skip(self, source), fields(title = %source.title()))]
    pub async fn generate(&self, source: &SourceDocument, count: usize) -> NovelistResult<Vec<Concept>> {
        let context = source_context(source, self.condense_chars, self.summary.as_deref());
        let options = self.client.options(self.temperature);

        let mut fingerprints: HashSet<String> = self
            .seeds
            .iter()
            .flat_map(parse_concepts)
            .map(|seed| content_fingerprint(&seed.setting, &seed.plot))
            .collect();
        let mut accepted: Vec<Concept> = Vec::with_capacity(count);
        let mut next_id = ConceptId::new(1);

        for round in 0..=self.extra_rounds {
            let missing = count.saturating_sub(accepted.len());
            if missing == 0 {
                break;
            }

            let previous = self.previous_block(&accepted);
            let prompt = self
                .templates
                .ideas(source.title(), &context, &previous, missing)?;
            let text = match self.client.complete("ideas", &prompt, &options).await {
                Ok(text) => text,
                Err(err) => {
                    let err = NovelistError::from(err);
                    if accepted.is_empty() || err.is_cancelled() {
                        return Err(err);
                    }
                    warn!(
                        round,
                        accepted = accepted.len(),
                        error = %err,
                        "Idea request failed, keeping concepts accepted so far"
                    );
                    break;
                }
            };

            let candidates = extract_json(&text)
                .map(|value| parse_concepts(&value))
                .unwrap_or_default();
            if candidates.is_empty() {
                warn!(round, "Response contained no usable concepts");
                continue;
            }

            for candidate in candidates {
                if accepted.len() == count {
                    break;
                }
                let fingerprint = content_fingerprint(&candidate.setting, &candidate.plot);
                if !fingerprints.insert(fingerprint.clone()) {
                    debug!(round, name = %candidate.name, "Skipping duplicate concept");
                    continue;
                }
                let candidate = if self.reflections > 1 {
                    let improved = self.reflect(source.title(), &candidate, &options).await?;
                    let improved_fingerprint =
                        content_fingerprint(&improved.setting, &improved.plot);
                    if improved_fingerprint == fingerprint
                        || fingerprints.insert(improved_fingerprint)
                    {
                        improved
                    } else {
                        debug!(
                            round,
                            name = %candidate.name,
                            "Reflection matched an existing concept"
                        );
                        candidate
                    }
                } else {
                    candidate
                };
                let name = if candidate.name.is_empty() {
                    format!("idea_{}", next_id.ordinal())
                } else {
                    candidate.name
                };
                let concept = Concept::new(
                    next_id,
                    name,
                    candidate.setting,
                    candidate.plot,
                    candidate.details,
                    Provenance::new(round, &prompt, self.client.model_name()),
                );
                debug!(concept_id = %next_id, round, "Accepted concept");
                accepted.push(concept);
                next_id = next_id.next();
            }
        }

        if accepted.is_empty() {
            return Err(PipelineError::new(PipelineErrorKind::NoIdeasGenerated).into());
        }
        if accepted.len() < count {
            warn!(
                requested = count,
                obtained = accepted.len(),
                "Proceeding with a partial idea batch"
            );
        } else {
            info!(count = accepted.len(), "Generated concepts");
        }
        Ok(accepted)
    }
}
