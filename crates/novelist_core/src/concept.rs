//! Candidate spin-off concepts.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::str::FromStr;

/// Identifier of a concept within a run.
///
/// Ids are allocated in generation order starting at 1, so ordering ids
/// orders concepts by when they were generated.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ConceptId(u32);

impl ConceptId {
    /// Wraps a generation ordinal.
    pub fn new(ordinal: u32) -> Self {
        Self(ordinal)
    }

    /// Generation ordinal.
    pub fn ordinal(&self) -> u32 {
        self.0
    }

    /// Id following this one.
    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }
}

impl std::fmt::Display for ConceptId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "idea-{:03}", self.0)
    }
}

impl FromStr for ConceptId {
    type Err = std::num::ParseIntError;

    /// Accepts both `idea-007` and `7`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s.trim().trim_start_matches("idea-");
        digits.parse::<u32>().map(Self)
    }
}

/// Where a concept came from.
#[derive(
    Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, derive_getters::Getters,
)]
pub struct Provenance {
    /// Generation round that produced the concept (0 is the first request)
    batch: u32,
    /// Digest of the prompt that produced the concept
    prompt_digest: String,
    /// Model that produced the concept
    model: String,
}

impl Provenance {
    /// Creates a provenance record, digesting the prompt text.
    pub fn new(batch: u32, prompt: &str, model: impl Into<String>) -> Self {
        let digest = Sha256::digest(prompt.as_bytes());
        let hex = format!("{:x}", digest);
        Self {
            batch,
            prompt_digest: hex[..16].to_string(),
            model: model.into(),
        }
    }
}

/// A candidate spin-off: setting plus plot seed, with optional vision details.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, derive_getters::Getters)]
pub struct Concept {
    /// Unique id within the run
    id: ConceptId,
    /// Short slug naming the concept
    name: String,
    /// Setting summary
    setting: String,
    /// Plot summary
    plot: String,
    /// Additional vision fields (theme, tone, protagonist, ...)
    details: BTreeMap<String, String>,
    /// Fingerprint of the normalized setting and plot
    fingerprint: String,
    /// Generation provenance
    provenance: Provenance,
}

impl Concept {
    /// Creates a concept and computes its content fingerprint.
    pub fn new(
        id: ConceptId,
        name: impl Into<String>,
        setting: impl Into<String>,
        plot: impl Into<String>,
        details: BTreeMap<String, String>,
        provenance: Provenance,
    ) -> Self {
        let setting = setting.into();
        let plot = plot.into();
        let fingerprint = content_fingerprint(&setting, &plot);
        Self {
            id,
            name: name.into(),
            setting,
            plot,
            details,
            fingerprint,
            provenance,
        }
    }

    /// Renders the concept as a labelled block for prompts.
    pub fn to_prompt_block(&self) -> String {
        let mut block = format!(
            "Name: {}\nSetting: {}\nPlot: {}",
            self.name, self.setting, self.plot
        );
        for (key, value) in &self.details {
            block.push_str(&format!("\n{}: {}", key, value));
        }
        block
    }
}

/// Lowercases, strips punctuation and collapses whitespace.
///
/// Letters and digits of any script are kept so non-Latin text normalizes
/// meaningfully.
pub fn normalize_content(text: &str) -> String {
    text.chars()
        .map(|c| {
            if c.is_alphanumeric() {
                c.to_lowercase().collect::<String>()
            } else {
                " ".to_string()
            }
        })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Fingerprint used to deduplicate concepts by normalized content.
pub fn content_fingerprint(setting: &str, plot: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(normalize_content(setting).as_bytes());
    hasher.update(b"\n");
    hasher.update(normalize_content(plot).as_bytes());
    format!("{:x}", hasher.finalize())
}
