//! Run coordination: phases, checkpoints and resume.

use crate::condense::{condense_source, source_context};
use crate::{
    CompletionClient, IdeaEvaluator, IdeaGenerator, PromptTemplates, RefinementEngine, select_top,
};
use futures::stream::{self, StreamExt};
use novelist_core::{
    Concept, ConceptId, ConceptStatus, NovelistConfig, RunId, RunPhase, RunState, Score,
    SourceDocument,
};
use novelist_error::{NovelistResult, StorageError, StorageErrorKind};
use novelist_interface::{CompletionDriver, RunStore, SourceProvider};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

/// Everything needed to start or resume a run.
#[derive(Debug, Clone)]
pub struct RunRequest {
    /// Run identifier; an existing run with this id is resumed
    pub run_id: RunId,
    /// Source identifier handed to the source provider
    pub source_identifier: String,
    /// Configuration for a new run (a resumed run keeps its snapshot)
    pub config: NovelistConfig,
    /// Example concepts the generator steers away from
    pub seed_concepts: Vec<Value>,
}

impl RunRequest {
    /// Request without seed concepts.
    pub fn new(run_id: RunId, source_identifier: impl Into<String>, config: NovelistConfig) -> Self {
        Self {
            run_id,
            source_identifier: source_identifier.into(),
            config,
            seed_concepts: Vec::new(),
        }
    }

    /// Adds seed concepts.
    pub fn with_seed_concepts(mut self, seeds: Vec<Value>) -> Self {
        self.seed_concepts = seeds;
        self
    }
}

/// Where a run stands after [`RunCoordinator::run`] returns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    /// Run identifier
    pub run_id: RunId,
    /// Phase reached
    pub phase: RunPhase,
    /// Concepts refined to completion
    pub completed: Vec<ConceptId>,
    /// Concepts that failed, with reasons
    pub failed: Vec<(ConceptId, String)>,
    /// True when cancellation stopped the run before it finished
    pub paused: bool,
}

impl RunSummary {
    fn from_state(state: &RunState, paused: bool) -> Self {
        let failed = state
            .selected()
            .iter()
            .filter_map(|id| match state.status_of(*id) {
                Some(ConceptStatus::Failed { reason }) => Some((*id, reason.clone())),
                _ => None,
            })
            .collect();
        Self {
            run_id: state.run_id().clone(),
            phase: *state.phase(),
            completed: state.completed_ids(),
            failed,
            paused,
        }
    }

    /// True when every selected concept reached a terminal status.
    pub fn is_complete(&self) -> bool {
        self.phase == RunPhase::Complete
    }
}

/// Stored view of a run, for inspection.
#[derive(Debug, Clone)]
pub struct RunReport {
    /// Checkpointed state
    pub state: RunState,
    /// Generated concepts
    pub concepts: Vec<Concept>,
    /// Evaluation scores
    pub scores: Vec<Score>,
    /// Drafts written per selected concept
    pub drafts: BTreeMap<ConceptId, usize>,
}

impl RunReport {
    /// Reads the stored state, concepts, scores and draft counts of a run.
    ///
    /// Needs only the store, so runs can be inspected without a completion
    /// endpoint.
    ///
    /// # Errors
    ///
    /// Fails when the run does not exist or cannot be read.
    pub async fn load(store: &dyn RunStore, run_id: &RunId) -> NovelistResult<Self> {
        let state = load_existing(store, run_id).await?;
        let concepts = store.load_concepts(run_id).await?;
        let scores = store.load_scores(run_id).await?;

        let mut drafts = BTreeMap::new();
        for id in state.selected() {
            let history = store.load_history(run_id, *id).await?;
            drafts.insert(*id, history.len());
        }

        Ok(Self {
            state,
            concepts,
            scores,
            drafts,
        })
    }
}

async fn load_existing(store: &dyn RunStore, run_id: &RunId) -> NovelistResult<RunState> {
    store.load_state(run_id).await?.ok_or_else(|| {
        StorageError::new(StorageErrorKind::NotFound(format!("run {}", run_id))).into()
    })
}

impl std::fmt::Display for RunReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = &self.state;
        writeln!(f, "Run {} [{}]", state.run_id(), state.phase())?;
        writeln!(
            f,
            "Source: {} ({})",
            state.source_title().as_deref().unwrap_or("untitled"),
            state.source_identifier()
        )?;
        if let Some(failure) = state.failure() {
            writeln!(f, "Last failure: {}", failure)?;
        }
        if self.concepts.is_empty() {
            return writeln!(f, "No concepts generated yet");
        }

        let ratings: HashMap<ConceptId, f64> = self
            .scores
            .iter()
            .map(|s| (*s.concept_id(), *s.rating()))
            .collect();
        writeln!(f, "Concepts:")?;
        for concept in &self.concepts {
            let id = *concept.id();
            let rating = ratings
                .get(&id)
                .map(|r| format!("{:.1}", r))
                .unwrap_or_else(|| "-".to_string());
            let status = state
                .status_of(id)
                .map(ToString::to_string)
                .unwrap_or_else(|| "not selected".to_string());
            let drafts = self.drafts.get(&id).copied().unwrap_or(0);
            writeln!(
                f,
                "  {}  {:<32} rating {:>4}  drafts {}  {}",
                id,
                concept.name(),
                rating,
                drafts,
                status
            )?;
        }
        Ok(())
    }
}

/// Sequences idea generation, evaluation and refinement for a run.
///
/// The coordinator is the only writer of the run state. It checkpoints after
/// idea generation, after selection and after every concept finishes, and a
/// resumed run picks up at the checkpointed phase.
pub struct RunCoordinator {
    driver: Arc<dyn CompletionDriver>,
    source: Arc<dyn SourceProvider>,
    store: Arc<dyn RunStore>,
    token: CancellationToken,
}

impl std::fmt::Debug for RunCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunCoordinator")
            .field("provider", &self.driver.provider_name())
            .field("cancelled", &self.token.is_cancelled())
            .finish()
    }
}

impl RunCoordinator {
    /// Coordinator over the given driver, source provider and store.
    pub fn new(
        driver: Arc<dyn CompletionDriver>,
        source: Arc<dyn SourceProvider>,
        store: Arc<dyn RunStore>,
    ) -> Self {
        Self {
            driver,
            source,
            store,
            token: CancellationToken::new(),
        }
    }

    /// Uses `token` to cancel runs.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.token = token;
        self
    }

    /// Token that cancels runs of this coordinator.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Starts a new run or resumes the one stored under the request's id.
    ///
    /// Cancellation is not an error: the run is checkpointed and a paused
    /// summary returned.
    ///
    /// # Errors
    ///
    /// Run-level failures (unreadable source, no usable ideas, fatal
    /// completion errors outside refinement, storage failures) are recorded in
    /// the stored state and returned. Failures of individual concepts are
    /// not errors; they appear in the summary.
    #[instrument(skip(self, request), fields(run_id = %request.run_id))]
    pub async fn run(&self, request: RunRequest) -> NovelistResult<RunSummary> {
        let mut state = match self.store.load_state(&request.run_id).await? {
            Some(state) => {
                info!(phase = %state.phase(), "Resuming run");
                if state.source_identifier() != &request.source_identifier {
                    warn!(
                        stored = %state.source_identifier(),
                        requested = %request.source_identifier,
                        "Ignoring requested source; resumed run keeps its own"
                    );
                }
                state
            }
            None => {
                request.config.validate()?;
                let state = RunState::new(
                    request.run_id.clone(),
                    request.source_identifier.clone(),
                    request.config.clone(),
                );
                self.store.save_state(&state).await?;
                info!("Started run");
                state
            }
        };

        if *state.phase() == RunPhase::Complete {
            info!("Run already complete");
            return Ok(RunSummary::from_state(&state, false));
        }
        state.clear_failure();

        match self.advance(&mut state, &request.seed_concepts).await {
            Ok(paused) => Ok(RunSummary::from_state(&state, paused)),
            Err(err) if err.is_cancelled() => {
                info!(phase = %state.phase(), "Run paused");
                self.store.save_state(&state).await?;
                Ok(RunSummary::from_state(&state, true))
            }
            Err(err) => {
                error!(phase = %state.phase(), error = %err, "Run failed");
                state.mark_failure(err.to_string());
                if let Err(save_err) = self.store.save_state(&state).await {
                    error!(error = %save_err, "Could not record run failure");
                }
                Err(err)
            }
        }
    }

    /// Runs phases until the run completes or pauses. Returns true when
    /// paused.
    async fn advance(&self, state: &mut RunState, seeds: &[Value]) -> NovelistResult<bool> {
        let config = state.config().clone();
        let templates = Arc::new(PromptTemplates::from_overrides(&config.prompts));
        let client = CompletionClient::new(self.driver.clone(), &config, self.token.clone())
            .with_system(templates.system());

        let source = self.source.load(state.source_identifier()).await?;
        if state.source_title().as_deref() != Some(source.title().as_str()) {
            state.set_source_title(source.title().clone());
        }

        loop {
            match *state.phase() {
                RunPhase::IdeaGeneration => {
                    self.generate_ideas(state, &source, &client, &templates, seeds)
                        .await?;
                }
                RunPhase::Evaluation => {
                    self.evaluate_and_select(state, &source, &client, &templates)
                        .await?;
                }
                RunPhase::Refinement => {
                    return self.refine_selected(state, &source, &client, &templates).await;
                }
                RunPhase::Complete => return Ok(false),
            }
        }
    }

    async fn generate_ideas(
        &self,
        state: &mut RunState,
        source: &SourceDocument,
        client: &CompletionClient,
        templates: &Arc<PromptTemplates>,
        seeds: &[Value],
    ) -> NovelistResult<()> {
        let run = &state.config().run;
        if run.summarize_source && state.source_summary().is_none() {
            let prompt = templates.summary(
                source.title(),
                source.author().as_deref().unwrap_or("Unknown"),
                &condense_source(source, run.condense_chars),
            )?;
            let options = client.options(state.config().llm.temperature);
            let summary = client.complete("summary", &prompt, &options).await?;
            state.set_source_summary(summary.trim());
            self.store.save_state(state).await?;
            info!("Summarized source");
        }

        let run = &state.config().run;
        let count = run.num_ideas as usize;
        let concepts = IdeaGenerator::new(client.clone(), templates.clone(), run)
            .with_seeds(seeds.to_vec())
            .with_summary(state.source_summary().clone())
            .generate(source, count)
            .await?;

        self.store.save_concepts(state.run_id(), &concepts).await?;
        state.record_concepts(concepts.iter().map(|c| *c.id()));
        state.advance_to(RunPhase::Evaluation)?;
        self.store.save_state(state).await?;
        Ok(())
    }

    async fn evaluate_and_select(
        &self,
        state: &mut RunState,
        source: &SourceDocument,
        client: &CompletionClient,
        templates: &Arc<PromptTemplates>,
    ) -> NovelistResult<()> {
        let run_id = state.run_id().clone();
        let concepts = self.store.load_concepts(&run_id).await?;
        let stored = self.store.load_scores(&run_id).await?;

        let by_concept: HashMap<ConceptId, Score> = stored
            .into_iter()
            .map(|score| (*score.concept_id(), score))
            .collect();
        let scored: Vec<(Concept, Score)> =
            if concepts.iter().all(|c| by_concept.contains_key(c.id())) {
                info!("Reusing stored scores");
                concepts
                    .into_iter()
                    .filter_map(|c| by_concept.get(c.id()).cloned().map(|s| (c, s)))
                    .collect()
            } else {
                let evaluator = IdeaEvaluator::new(
                    client.clone(),
                    templates.clone(),
                    source.title().clone(),
                    &state.config().run,
                );
                let scored = evaluator.evaluate(&concepts).await?;
                let scores: Vec<Score> = scored.iter().map(|(_, s)| s.clone()).collect();
                self.store.save_scores(&run_id, &scores).await?;
                scored
            };

        let selected = select_top(&scored, state.config().run.top_k());
        info!(
            evaluated = scored.len(),
            selected = selected.len(),
            "Selected concepts for refinement"
        );
        state.begin_refinement(selected.iter().map(|c| *c.id()).collect())?;
        self.store.save_state(state).await?;
        Ok(())
    }

    async fn refine_selected(
        &self,
        state: &mut RunState,
        source: &SourceDocument,
        client: &CompletionClient,
        templates: &Arc<PromptTemplates>,
    ) -> NovelistResult<bool> {
        let run_id = state.run_id().clone();
        let run = state.config().run.clone();
        let concepts: HashMap<ConceptId, Concept> = self
            .store
            .load_concepts(&run_id)
            .await?
            .into_iter()
            .map(|c| (*c.id(), c))
            .collect();

        let engine = RefinementEngine::new(
            client.clone(),
            templates.clone(),
            self.store.clone(),
            run_id.clone(),
            &run,
            source.title().clone(),
            source_context(source, run.condense_chars, state.source_summary().as_deref()),
        );

        let pending = state.pending_ids();
        info!(pending = pending.len(), workers = run.workers, "Refining concepts");

        let mut outcomes = stream::iter(pending)
            .map(|id| {
                let engine = engine.clone();
                let concept = concepts.get(&id).cloned();
                async move {
                    let status = match concept {
                        Some(concept) => engine.refine(&concept).await,
                        None => ConceptStatus::Failed {
                            reason: format!("concept {} missing from the store", id),
                        },
                    };
                    (id, status)
                }
            })
            .buffer_unordered(run.workers.max(1));

        while let Some((id, status)) = outcomes.next().await {
            info!(concept_id = %id, status = %status, "Concept finished");
            state.record_outcome(id, status)?;
            self.store.save_state(state).await?;
        }

        if state.complete_if_terminal()? {
            self.store.save_state(state).await?;
            info!(
                completed = state.completed_ids().len(),
                selected = state.selected().len(),
                "Run complete"
            );
        }

        let paused = *state.phase() != RunPhase::Complete
            && state
                .pending_ids()
                .iter()
                .any(|id| state.status_of(*id) == Some(&ConceptStatus::Paused));
        Ok(paused)
    }

    /// Returns a failed or paused concept to refinement.
    ///
    /// The next [`run`](Self::run) continues the concept from its last
    /// stored draft.
    ///
    /// # Errors
    ///
    /// Fails when the run does not exist, the concept was not selected, or
    /// the concept is already done.
    #[instrument(skip(self), fields(run_id = %run_id, concept_id = %concept_id))]
    pub async fn reopen(&self, run_id: &RunId, concept_id: ConceptId) -> NovelistResult<RunState> {
        let mut state = self.load_existing(run_id).await?;
        state.reopen_concept(concept_id)?;
        self.store.save_state(&state).await?;
        info!("Reopened concept");
        Ok(state)
    }

    /// Stored view of a run.
    ///
    /// # Errors
    ///
    /// Fails when the run does not exist or cannot be read.
    pub async fn report(&self, run_id: &RunId) -> NovelistResult<RunReport> {
        RunReport::load(self.store.as_ref(), run_id).await
    }

    async fn load_existing(&self, run_id: &RunId) -> NovelistResult<RunState> {
        load_existing(self.store.as_ref(), run_id).await
    }
}
