//! Durable run state.
//!
//! [`RunState`] is the checkpoint that makes a run resumable. It records the
//! current phase, the concepts generated and selected, and the refinement
//! status of every selected concept. Phases only move forward, with the
//! single exception of reopening a concept after the run completed.

use crate::{ConceptId, NovelistConfig};
use chrono::{DateTime, Utc};
use novelist_error::{PipelineError, PipelineErrorKind};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::str::FromStr;

/// Identifier of a run, used as a directory name under the state directory.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RunId(String);

impl RunId {
    /// Fresh random run id.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Run id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for RunId {
    type Err = PipelineError;

    /// Accepts ASCII letters, digits, `-`, `_` and `.`, not starting with `.`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let valid = !s.is_empty()
            && !s.starts_with('.')
            && s.len() <= 128
            && s
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
        if valid {
            Ok(Self(s.to_string()))
        } else {
            Err(PipelineError::new(PipelineErrorKind::InvalidRunId(
                s.to_string(),
            )))
        }
    }
}

impl TryFrom<String> for RunId {
    type Error = PipelineError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<RunId> for String {
    fn from(id: RunId) -> Self {
        id.0
    }
}

/// Phase of a run. Variants are declared in execution order.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum RunPhase {
    /// Producing candidate concepts from the source
    IdeaGeneration,
    /// Scoring concepts and selecting the best
    Evaluation,
    /// Drafting and revising selected concepts
    Refinement,
    /// Every selected concept reached a terminal status
    Complete,
}

impl RunPhase {
    /// Phase that follows this one, if any.
    pub fn next(self) -> Option<RunPhase> {
        match self {
            RunPhase::IdeaGeneration => Some(RunPhase::Evaluation),
            RunPhase::Evaluation => Some(RunPhase::Refinement),
            RunPhase::Refinement => Some(RunPhase::Complete),
            RunPhase::Complete => None,
        }
    }
}

/// Refinement status of a selected concept.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ConceptStatus {
    /// Not yet finished; picked up on resume
    Pending,
    /// Interrupted by cancellation; picked up on resume
    Paused,
    /// Critique resolved or iteration cap reached
    Done,
    /// Stopped by an unrecoverable error
    Failed {
        /// Error message
        reason: String,
    },
}

impl ConceptStatus {
    /// Done and failed concepts are not resumed automatically.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ConceptStatus::Done | ConceptStatus::Failed { .. })
    }

    /// Short lowercase label.
    pub fn label(&self) -> &'static str {
        match self {
            ConceptStatus::Pending => "pending",
            ConceptStatus::Paused => "paused",
            ConceptStatus::Done => "done",
            ConceptStatus::Failed { .. } => "failed",
        }
    }
}

impl std::fmt::Display for ConceptStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConceptStatus::Failed { reason } => write!(f, "failed ({})", reason),
            other => f.write_str(other.label()),
        }
    }
}

/// Checkpoint of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, derive_getters::Getters)]
pub struct RunState {
    /// Run identifier
    run_id: RunId,
    /// Current phase
    phase: RunPhase,
    /// Identifier of the source document
    source_identifier: String,
    /// Title of the source document, once loaded
    source_title: Option<String>,
    /// Number of concepts requested
    requested_ideas: u32,
    /// Concepts generated, in generation order
    concept_ids: Vec<ConceptId>,
    /// Concepts chosen for refinement, best first
    selected: Vec<ConceptId>,
    /// Refinement status per selected concept
    statuses: BTreeMap<ConceptId, ConceptStatus>,
    /// Configuration the run was started with
    config: NovelistConfig,
    /// Model-written summary of the source, when requested
    source_summary: Option<String>,
    /// Reason the run stopped, when it aborted
    failure: Option<String>,
    /// Creation time
    created_at: DateTime<Utc>,
    /// Last modification time
    updated_at: DateTime<Utc>,
}

impl RunState {
    /// New run in the idea generation phase.
    pub fn new(
        run_id: RunId,
        source_identifier: impl Into<String>,
        config: NovelistConfig,
    ) -> Self {
        let now = Utc::now();
        Self {
            run_id,
            phase: RunPhase::IdeaGeneration,
            source_identifier: source_identifier.into(),
            source_title: None,
            requested_ideas: config.run.num_ideas,
            concept_ids: Vec::new(),
            selected: Vec::new(),
            statuses: BTreeMap::new(),
            config,
            source_summary: None,
            failure: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Moves to the next phase.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTransition` unless `next` directly follows the current
    /// phase.
    pub fn advance_to(&mut self, next: RunPhase) -> Result<(), PipelineError> {
        if self.phase.next() != Some(next) {
            return Err(PipelineError::new(PipelineErrorKind::InvalidTransition {
                from: self.phase.to_string(),
                to: next.to_string(),
            }));
        }
        tracing::debug!(run_id = %self.run_id, from = %self.phase, to = %next, "Advancing phase");
        self.phase = next;
        self.touch();
        Ok(())
    }

    /// Records generated concepts in generation order.
    pub fn record_concepts(&mut self, ids: impl IntoIterator<Item = ConceptId>) {
        self.concept_ids = ids.into_iter().collect();
        self.touch();
    }

    /// Records the title of the loaded source.
    pub fn set_source_title(&mut self, title: impl Into<String>) {
        self.source_title = Some(title.into());
        self.touch();
    }

    /// Stores the model-written source summary.
    pub fn set_source_summary(&mut self, summary: impl Into<String>) {
        self.source_summary = Some(summary.into());
        self.touch();
    }

    /// Records the selection and enters refinement with every selected
    /// concept pending.
    ///
    /// # Errors
    ///
    /// Fails when the run is not in evaluation, when a selected id is unknown
    /// or repeated, or when more concepts are selected than were requested or
    /// generated.
    pub fn begin_refinement(&mut self, selected: Vec<ConceptId>) -> Result<(), PipelineError> {
        let known: HashSet<ConceptId> = self.concept_ids.iter().copied().collect();
        let mut seen = HashSet::new();
        for id in &selected {
            if !known.contains(id) || !seen.insert(*id) {
                return Err(PipelineError::new(PipelineErrorKind::UnknownConcept(
                    id.to_string(),
                )));
            }
        }
        let cap = (self.requested_ideas as usize).min(self.concept_ids.len());
        if selected.len() > cap {
            return Err(PipelineError::new(PipelineErrorKind::InvalidTransition {
                from: format!("{} selected", selected.len()),
                to: format!("at most {} refined", cap),
            }));
        }

        self.advance_to(RunPhase::Refinement)?;
        self.statuses = selected
            .iter()
            .map(|id| (*id, ConceptStatus::Pending))
            .collect();
        self.selected = selected;
        Ok(())
    }

    /// Status of a selected concept.
    pub fn status_of(&self, id: ConceptId) -> Option<&ConceptStatus> {
        self.statuses.get(&id)
    }

    /// Records the refinement outcome of a selected concept.
    ///
    /// # Errors
    ///
    /// Returns `UnknownConcept` when `id` was not selected.
    pub fn record_outcome(
        &mut self,
        id: ConceptId,
        status: ConceptStatus,
    ) -> Result<(), PipelineError> {
        match self.statuses.get_mut(&id) {
            Some(slot) => {
                *slot = status;
                self.touch();
                Ok(())
            }
            None => Err(PipelineError::new(PipelineErrorKind::UnknownConcept(
                id.to_string(),
            ))),
        }
    }

    /// Selected concepts still to be refined, in selection order.
    pub fn pending_ids(&self) -> Vec<ConceptId> {
        self.selected
            .iter()
            .filter(|id| {
                self.statuses
                    .get(id)
                    .is_some_and(|status| !status.is_terminal())
            })
            .copied()
            .collect()
    }

    /// Selected concepts refined to completion.
    pub fn completed_ids(&self) -> Vec<ConceptId> {
        self.selected
            .iter()
            .filter(|id| self.statuses.get(id) == Some(&ConceptStatus::Done))
            .copied()
            .collect()
    }

    /// True when every selected concept is done or failed.
    pub fn all_terminal(&self) -> bool {
        self.statuses.values().all(ConceptStatus::is_terminal)
    }

    /// Number of selected concepts per status label.
    pub fn status_counts(&self) -> BTreeMap<&'static str, usize> {
        let mut counts = BTreeMap::new();
        for status in self.statuses.values() {
            *counts.entry(status.label()).or_insert(0) += 1;
        }
        counts
    }

    /// Marks the run complete when refinement has nothing left to do.
    ///
    /// Returns true when the phase changed.
    pub fn complete_if_terminal(&mut self) -> Result<bool, PipelineError> {
        if self.phase == RunPhase::Refinement && self.all_terminal() {
            self.advance_to(RunPhase::Complete)?;
            return Ok(true);
        }
        Ok(false)
    }

    /// Returns a failed or paused concept to pending.
    ///
    /// A completed run moves back to refinement so the concept is picked up.
    ///
    /// # Errors
    ///
    /// Returns `UnknownConcept` for ids that were not selected and
    /// `NotRestartable` for concepts that are already done.
    pub fn reopen_concept(&mut self, id: ConceptId) -> Result<(), PipelineError> {
        let status = self.statuses.get_mut(&id).ok_or_else(|| {
            PipelineError::new(PipelineErrorKind::UnknownConcept(id.to_string()))
        })?;
        match status {
            ConceptStatus::Failed { .. } | ConceptStatus::Paused => {
                *status = ConceptStatus::Pending;
            }
            ConceptStatus::Pending => {}
            ConceptStatus::Done => {
                return Err(PipelineError::new(PipelineErrorKind::NotRestartable {
                    concept_id: id.to_string(),
                    status: status.to_string(),
                }));
            }
        }
        if self.phase == RunPhase::Complete {
            self.phase = RunPhase::Refinement;
        }
        self.failure = None;
        self.touch();
        Ok(())
    }

    /// Records why the run aborted.
    pub fn mark_failure(&mut self, reason: impl Into<String>) {
        self.failure = Some(reason.into());
        self.touch();
    }

    /// Clears a previous abort reason before resuming.
    pub fn clear_failure(&mut self) {
        if self.failure.take().is_some() {
            self.touch();
        }
    }
}
