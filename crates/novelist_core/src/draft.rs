//! Manuscript drafts and their append-only history records.

use crate::ConceptId;
use chrono::{DateTime, Utc};
use novelist_error::{StorageError, StorageErrorKind};
use serde::{Deserialize, Serialize};

/// Critique attached to a draft.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, derive_getters::Getters)]
pub struct Critique {
    /// Critique text
    text: String,
    /// True when the critique signalled that no further changes are needed
    resolved: bool,
    /// When the critique was recorded
    created_at: DateTime<Utc>,
}

impl Critique {
    /// Creates a critique recorded now.
    pub fn new(text: impl Into<String>, resolved: bool) -> Self {
        Self {
            text: text.into(),
            resolved,
            created_at: Utc::now(),
        }
    }
}

/// One iteration of manuscript text for a concept.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, derive_getters::Getters)]
pub struct ManuscriptDraft {
    /// Concept the draft belongs to
    concept_id: ConceptId,
    /// Iteration index, gapless from 0
    iteration: u32,
    /// Full manuscript text
    text: String,
    /// Critique of this draft, once requested
    critique: Option<Critique>,
    /// When the draft was recorded
    created_at: DateTime<Utc>,
}

impl ManuscriptDraft {
    /// Creates an uncritiqued draft recorded now.
    pub fn new(concept_id: ConceptId, iteration: u32, text: impl Into<String>) -> Self {
        Self {
            concept_id,
            iteration,
            text: text.into(),
            critique: None,
            created_at: Utc::now(),
        }
    }

    /// History record that persists this draft.
    pub fn to_record(&self) -> HistoryRecord {
        HistoryRecord::Draft {
            concept_id: self.concept_id,
            iteration: self.iteration,
            text: self.text.clone(),
            created_at: self.created_at,
        }
    }
}

/// Entry of a concept's append-only history log.
///
/// Drafts and critiques are separate records so a critique can be persisted
/// without rewriting the draft it refers to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "record", rename_all = "snake_case")]
pub enum HistoryRecord {
    /// A new draft
    Draft {
        /// Concept id
        concept_id: ConceptId,
        /// Iteration index
        iteration: u32,
        /// Manuscript text
        text: String,
        /// Creation time
        created_at: DateTime<Utc>,
    },
    /// A critique of an existing draft
    Critique {
        /// Concept id
        concept_id: ConceptId,
        /// Iteration index of the critiqued draft
        iteration: u32,
        /// Critique text
        text: String,
        /// No further changes requested
        resolved: bool,
        /// Creation time
        created_at: DateTime<Utc>,
    },
}

impl HistoryRecord {
    /// Record persisting a critique of `iteration`.
    pub fn critique(concept_id: ConceptId, iteration: u32, critique: &Critique) -> Self {
        HistoryRecord::Critique {
            concept_id,
            iteration,
            text: critique.text.clone(),
            resolved: critique.resolved,
            created_at: critique.created_at,
        }
    }

    /// Concept the record belongs to.
    pub fn concept_id(&self) -> ConceptId {
        match self {
            HistoryRecord::Draft { concept_id, .. }
            | HistoryRecord::Critique { concept_id, .. } => *concept_id,
        }
    }

    /// Iteration index the record refers to.
    pub fn iteration(&self) -> u32 {
        match self {
            HistoryRecord::Draft { iteration, .. } | HistoryRecord::Critique { iteration, .. } => {
                *iteration
            }
        }
    }
}

/// Applies `record` to an in-order draft history, enforcing the invariants.
///
/// Drafts must arrive with iteration equal to the current history length;
/// critiques must refer to an existing draft.
pub fn apply_record(
    drafts: &mut Vec<ManuscriptDraft>,
    record: HistoryRecord,
) -> Result<(), StorageError> {
    match record {
        HistoryRecord::Draft {
            concept_id,
            iteration,
            text,
            created_at,
        } => {
            let expected = drafts.len() as u32;
            if iteration != expected {
                return Err(StorageError::new(StorageErrorKind::IterationGap {
                    concept_id: concept_id.to_string(),
                    expected,
                    actual: iteration,
                }));
            }
            drafts.push(ManuscriptDraft {
                concept_id,
                iteration,
                text,
                critique: None,
                created_at,
            });
        }
        HistoryRecord::Critique {
            concept_id,
            iteration,
            text,
            resolved,
            created_at,
        } => {
            let draft = drafts.get_mut(iteration as usize).ok_or_else(|| {
                StorageError::new(StorageErrorKind::MissingDraft {
                    concept_id: concept_id.to_string(),
                    iteration,
                })
            })?;
            draft.critique = Some(Critique {
                text,
                resolved,
                created_at,
            });
        }
    }
    Ok(())
}

/// Folds history records into the ordered draft sequence.
///
/// # Errors
///
/// Returns an error if the records contain an iteration gap or a critique of
/// a draft that was never recorded.
pub fn fold_history(
    records: impl IntoIterator<Item = HistoryRecord>,
) -> Result<Vec<ManuscriptDraft>, StorageError> {
    let mut drafts = Vec::new();
    for record in records {
        apply_record(&mut drafts, record)?;
    }
    Ok(drafts)
}
