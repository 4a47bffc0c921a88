//! Evaluation scores.

use crate::ConceptId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Rating assigned to a concept by the evaluator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, derive_getters::Getters)]
pub struct Score {
    /// Concept being rated
    concept_id: ConceptId,
    /// Overall rating (mean of the criteria, 0 when unscored)
    rating: f64,
    /// Per-criterion ratings
    criteria: BTreeMap<String, u8>,
    /// Evaluator rationale
    rationale: String,
}

impl Score {
    /// Builds a score whose rating is the mean of the criteria.
    pub fn from_criteria(
        concept_id: ConceptId,
        criteria: BTreeMap<String, u8>,
        rationale: impl Into<String>,
    ) -> Self {
        let rating = if criteria.is_empty() {
            0.0
        } else {
            criteria.values().map(|v| f64::from(*v)).sum::<f64>() / criteria.len() as f64
        };
        Self {
            concept_id,
            rating,
            criteria,
            rationale: rationale.into(),
        }
    }

    /// Placeholder score for a concept the evaluator could not rate.
    pub fn unscored(concept_id: ConceptId, reason: impl Into<String>) -> Self {
        Self {
            concept_id,
            rating: 0.0,
            criteria: BTreeMap::new(),
            rationale: format!("unscored: {}", reason.into()),
        }
    }
}
