//! Prompt templates.
//!
//! Templates use `{placeholder}` substitution. Every template has a built-in
//! default which can be replaced through the `[prompts]` configuration
//! section. A template may use any subset of the placeholders offered for
//! it; naming an unknown placeholder is an error.

use novelist_core::PromptOverrides;
use novelist_error::{PipelineError, PipelineErrorKind};

const DEFAULT_SYSTEM: &str = "\
You are an exceptionally talented novel editor and novelist responsible for \
numerous bestselling novels. You are planning and writing a spin-off of a \
well-loved original work.";

const DEFAULT_SUMMARY: &str = "\
# Source Summary
Read the following original work carefully, grasp the characters and the \
world-building accurately, and summarize it in approximately 300 words.

Title: {title}
Author: {author}

{source}";

const DEFAULT_IDEAS: &str = "\
# Spin-off Concepts
Next year a spin-off novel based on the original work below will be \
published. Its sales performance directly decides the survival of the \
company, so the concept must be compelling.

## Original work: {title}
{source}

## Concepts proposed by other editors
Take a completely different direction from every concept listed here.
{previous}

## Task
Propose {count} new, distinct spin-off concepts. Answer with a JSON array \
inside a ```json fenced block. Each element is an object with these fields:
- \"name\": a unique lowercase identifier, underscores instead of spaces
- \"setting\": where and when the spin-off takes place
- \"plot\": the central storyline in a few sentences
- \"theme\": the overarching theme or message
- \"target_demographics\": the primary audience
- \"novel_structure_model\": e.g. three-act structure, hero's journey, kishotenketsu
- \"narrative_perspective\": who tells the story and how
- \"core_connection\": how the spin-off ties back to the original work
- \"unique_hook\": what sets it apart from the original and other works
- \"protagonist\": who the story follows
- \"tone_and_style\": serious, comedic, dark, light, ...
- \"world_expansion\": how the original world is extended
- \"fan_service\": elements for fans of the original

Describe every field except \"name\" in 100 to 200 characters.";

const DEFAULT_IDEA_REFLECTION: &str = "\
# Concept Reflection
Round {round}/{max_rounds}.
Carefully reconsider the following spin-off concept for \"{title}\". Judge \
how strongly it would move readers, how well it fits its market and how \
novel it is, then improve whatever is weak. Keep it clear and concise and \
keep every field.

## Concept
{concept}

## Task
Briefly explain your reasoning, then answer with the complete concept as a \
single JSON object inside a ```json fenced block, using the same fields. If \
there is nothing to improve, repeat the JSON exactly and write \
{done_marker} before it. Only write {done_marker} when you make no more \
changes.";

const DEFAULT_EVALUATION: &str = "\
# Concept Evaluation
Evaluate the following spin-off concept for \"{title}\" on three criteria, \
each rated from 1 to 10:
- \"emotion\": ability to captivate the reader, evoke empathy and create immersion
- \"market\": fit with the target market and demand for the theme or setting
- \"novelty\": originality and differentiation from other works

## Concept
{concept}

Answer with a single JSON object inside a ```json fenced block with the \
integer fields \"emotion\", \"market\", \"novelty\" and a short \
\"rationale\" string.";

const DEFAULT_DRAFT: &str = "\
# First Draft
Write a complete spin-off of \"{title}\" following the editor's concept \
below. Fully reflect every item of the concept, follow its structure model, \
divide the novel into at most five titled chapters, and leave no \
placeholders.

## Original work
{source}

## Concept
{concept}

Answer with the manuscript only, in Markdown, starting with the title.";

const DEFAULT_CRITIQUE: &str = "\
# Editorial Critique
You are reviewing draft {iteration} of {max_iterations} of a spin-off novel \
before publication. Check it against the concept and this checklist:
- Is every item of the concept reflected?
- Is the story engaging throughout?
- Are transitions between chapters natural and seamless?
- Are similar phrases overused?
- Are chapter lengths consistent, and do chapter titles reflect their content?
- Is the plot consistent with itself and with the original work?

## Concept
{concept}

## Draft
{draft}

List every actionable issue with a concrete fix. If the draft needs no \
further changes, reply with exactly {done_marker} and nothing else.";

const DEFAULT_REVISE: &str = "\
# Revision
Revise the spin-off manuscript below so that it resolves every issue in the \
editor's critique while staying faithful to the concept. Make the revision \
complete, with no placeholders, and keep what already works.

## Concept
{concept}

## Current draft
{draft}

## Critique
{critique}

Answer with the full revised manuscript only, in Markdown.";

/// Resolved prompt templates for a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplates {
    system: String,
    summary: String,
    ideas: String,
    idea_reflection: String,
    evaluation: String,
    draft: String,
    critique: String,
    revise: String,
}

impl Default for PromptTemplates {
    fn default() -> Self {
        Self::from_overrides(&PromptOverrides::default())
    }
}

impl PromptTemplates {
    /// Built-in templates with any configured overrides applied.
    pub fn from_overrides(overrides: &PromptOverrides) -> Self {
        let pick = |custom: &Option<String>, default: &str| {
            custom.clone().unwrap_or_else(|| default.to_string())
        };
        Self {
            system: pick(&overrides.system, DEFAULT_SYSTEM),
            summary: pick(&overrides.summary, DEFAULT_SUMMARY),
            ideas: pick(&overrides.ideas, DEFAULT_IDEAS),
            idea_reflection: pick(&overrides.idea_reflection, DEFAULT_IDEA_REFLECTION),
            evaluation: pick(&overrides.evaluation, DEFAULT_EVALUATION),
            draft: pick(&overrides.draft, DEFAULT_DRAFT),
            critique: pick(&overrides.critique, DEFAULT_CRITIQUE),
            revise: pick(&overrides.revise, DEFAULT_REVISE),
        }
    }

    /// System prompt sent with every call.
    pub fn system(&self) -> &str {
        &self.system
    }

    /// Placeholders: `title`, `author`, `source`.
    pub fn summary(&self, title: &str, author: &str, source: &str) -> Result<String, PipelineError> {
        render(
            "summary",
            &self.summary,
            &[("title", title), ("author", author), ("source", source)],
        )
    }

    /// Placeholders: `title`, `source`, `previous`, `count`.
    pub fn ideas(
        &self,
        title: &str,
        source: &str,
        previous: &str,
        count: usize,
    ) -> Result<String, PipelineError> {
        let count = count.to_string();
        render(
            "ideas",
            &self.ideas,
            &[
                ("title", title),
                ("source", source),
                ("previous", previous),
                ("count", &count),
            ],
        )
    }

    /// Placeholders: `title`, `concept`, `round`, `max_rounds`,
    /// `done_marker`.
    ///
    /// `round` counts the initial proposal as round 1.
    pub fn idea_reflection(
        &self,
        title: &str,
        concept: &str,
        round: u32,
        max_rounds: u32,
        done_marker: &str,
    ) -> Result<String, PipelineError> {
        let round = round.to_string();
        let max_rounds = max_rounds.to_string();
        render(
            "idea_reflection",
            &self.idea_reflection,
            &[
                ("title", title),
                ("concept", concept),
                ("round", &round),
                ("max_rounds", &max_rounds),
                ("done_marker", done_marker),
            ],
        )
    }

    /// Placeholders: `title`, `concept`.
    pub fn evaluation(&self, title: &str, concept: &str) -> Result<String, PipelineError> {
        render(
            "evaluation",
            &self.evaluation,
            &[("title", title), ("concept", concept)],
        )
    }

    /// Placeholders: `title`, `source`, `concept`.
    pub fn draft(&self, title: &str, source: &str, concept: &str) -> Result<String, PipelineError> {
        render(
            "draft",
            &self.draft,
            &[("title", title), ("source", source), ("concept", concept)],
        )
    }

    /// Placeholders: `concept`, `draft`, `iteration`, `max_iterations`,
    /// `done_marker`.
    pub fn critique(
        &self,
        concept: &str,
        draft: &str,
        iteration: u32,
        max_iterations: u32,
        done_marker: &str,
    ) -> Result<String, PipelineError> {
        let iteration = (iteration + 1).to_string();
        let max_iterations = max_iterations.to_string();
        render(
            "critique",
            &self.critique,
            &[
                ("concept", concept),
                ("draft", draft),
                ("iteration", &iteration),
                ("max_iterations", &max_iterations),
                ("done_marker", done_marker),
            ],
        )
    }

    /// Placeholders: `concept`, `draft`, `critique`.
    pub fn revise(&self, concept: &str, draft: &str, critique: &str) -> Result<String, PipelineError> {
        render(
            "revise",
            &self.revise,
            &[("concept", concept), ("draft", draft), ("critique", critique)],
        )
    }
}

/// Finds the next `{name}` placeholder at or after `from`, where `name` is
/// lowercase letters and underscores. Returns the byte range of the braces
/// and the name.
fn next_placeholder(template: &str, from: usize) -> Option<(usize, usize, &str)> {
    let mut search = from;
    while let Some(offset) = template[search..].find('{') {
        let open = search + offset;
        let rest = &template[open + 1..];
        let name_len = rest
            .find(|c: char| !(c.is_ascii_lowercase() || c == '_'))
            .unwrap_or(rest.len());
        if name_len > 0 && rest[name_len..].starts_with('}') {
            let close = open + 1 + name_len;
            return Some((open, close + 1, &rest[..name_len]));
        }
        search = open + 1;
    }
    None
}

/// Substitutes placeholders in a single pass, so substituted values are
/// never scanned for further placeholders.
fn render(name: &str, template: &str, values: &[(&str, &str)]) -> Result<String, PipelineError> {
    let mut rendered = String::with_capacity(template.len());
    let mut cursor = 0;
    while let Some((start, end, key)) = next_placeholder(template, cursor) {
        let value = values
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| *v)
            .ok_or_else(|| {
                PipelineError::new(PipelineErrorKind::UnresolvedPlaceholder {
                    template: name.to_string(),
                    placeholder: key.to_string(),
                })
            })?;
        rendered.push_str(&template[cursor..start]);
        rendered.push_str(value);
        cursor = end;
    }
    rendered.push_str(&template[cursor..]);
    Ok(rendered)
}
