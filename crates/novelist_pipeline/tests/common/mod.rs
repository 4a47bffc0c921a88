//! Shared fixtures for pipeline tests.
#![allow(dead_code)]

use async_trait::async_trait;
use novelist_core::{
    Concept, ConceptId, GenerateRequest, GenerateResponse, NovelistConfig, Provenance, RetryConfig,
    SourceDocument,
};
use novelist_error::{CompletionError, CompletionErrorKind, NovelistResult};
use novelist_interface::{CompletionDriver, SourceProvider};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Mutex;
use tokio_util::sync::CancellationToken;

pub const DONE: &str = "NO_FURTHER_CHANGES";

/// Pipeline stage a prompt belongs to, read from its leading heading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Summary,
    Ideas,
    Reflection,
    Evaluation,
    Draft,
    Critique,
    Revise,
}

impl Stage {
    fn of(prompt: &str) -> Stage {
        let heading = prompt.lines().next().unwrap_or_default();
        match heading {
            "# Source Summary" => Stage::Summary,
            "# Spin-off Concepts" => Stage::Ideas,
            "# Concept Reflection" => Stage::Reflection,
            "# Concept Evaluation" => Stage::Evaluation,
            "# First Draft" => Stage::Draft,
            "# Editorial Critique" => Stage::Critique,
            "# Revision" => Stage::Revise,
            other => panic!("unexpected prompt heading: {other}"),
        }
    }
}

/// When the critique reports that no further changes are needed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CritiquePolicy {
    /// Never satisfied
    Never,
    /// Satisfied with the given draft number (1 is the first draft)
    ResolveAtDraft(u32),
}

#[derive(Default)]
struct Script {
    calls: HashMap<Stage, usize>,
    prompts: Vec<(Stage, String)>,
    failures: Vec<(Stage, CompletionErrorKind)>,
    failing_after: Option<(Stage, usize, CompletionErrorKind)>,
    idea_responses: VecDeque<String>,
    idea_counter: usize,
    cancel: Option<(Stage, usize, CancellationToken)>,
}

/// Deterministic driver answering each pipeline prompt with canned text.
///
/// Drafts and revisions are derived from the prompt, so the same sequence of
/// prompts always yields the same manuscripts.
pub struct ScriptedDriver {
    ideas_per_response: usize,
    critique: CritiquePolicy,
    converge_at_round: Option<u32>,
    ratings: HashMap<String, u8>,
    empty: Vec<Stage>,
    script: Mutex<Script>,
}

impl ScriptedDriver {
    pub fn new() -> Self {
        Self {
            ideas_per_response: 2,
            critique: CritiquePolicy::ResolveAtDraft(2),
            converge_at_round: None,
            ratings: HashMap::new(),
            empty: Vec::new(),
            script: Mutex::new(Script::default()),
        }
    }

    pub fn ideas_per_response(mut self, n: usize) -> Self {
        self.ideas_per_response = n;
        self
    }

    pub fn critique_policy(mut self, policy: CritiquePolicy) -> Self {
        self.critique = policy;
        self
    }

    /// Reflection repeats the concept with the done marker from `round` on.
    /// Earlier rounds append " (refined)" to the plot.
    pub fn reflection_converges_at(mut self, round: u32) -> Self {
        self.converge_at_round = Some(round);
        self
    }

    /// Rating for every criterion of the named concept (default 7).
    pub fn rating(mut self, name: &str, value: u8) -> Self {
        self.ratings.insert(name.to_string(), value);
        self
    }

    /// Always answers `stage` with an empty string.
    pub fn empty_responses(mut self, stage: Stage) -> Self {
        self.empty.push(stage);
        self
    }

    /// Raw idea responses returned in order before generated ones.
    pub fn idea_responses(self, responses: Vec<String>) -> Self {
        self.script.lock().unwrap().idea_responses = responses.into();
        self
    }

    /// Fails the next call of `stage` with `kind`.
    pub fn fail_once(self, stage: Stage, kind: CompletionErrorKind) -> Self {
        self.script.lock().unwrap().failures.push((stage, kind));
        self
    }

    /// Fails every call of `stage` after the first `after` calls.
    pub fn fail_after(self, stage: Stage, after: usize, kind: CompletionErrorKind) -> Self {
        self.script.lock().unwrap().failing_after = Some((stage, after, kind));
        self
    }

    /// Cancels `token` while answering the `nth` call of `stage`.
    pub fn cancel_on(self, stage: Stage, nth: usize, token: CancellationToken) -> Self {
        self.script.lock().unwrap().cancel = Some((stage, nth, token));
        self
    }

    pub fn calls(&self, stage: Stage) -> usize {
        self.script
            .lock()
            .unwrap()
            .calls
            .get(&stage)
            .copied()
            .unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.script.lock().unwrap().calls.values().sum()
    }

    pub fn prompts(&self, stage: Stage) -> Vec<String> {
        self.script
            .lock()
            .unwrap()
            .prompts
            .iter()
            .filter(|(s, _)| *s == stage)
            .map(|(_, p)| p.clone())
            .collect()
    }

    fn respond(&self, stage: Stage, prompt: &str, script: &mut Script) -> String {
        if self.empty.contains(&stage) {
            return String::new();
        }
        match stage {
            Stage::Summary => "A runner keeps his promise to a friend.".to_string(),
            Stage::Ideas => {
                if let Some(raw) = script.idea_responses.pop_front() {
                    return raw;
                }
                let requested = number_after(prompt, "Propose ").unwrap_or(1) as usize;
                let ideas: Vec<String> = (0..requested.min(self.ideas_per_response))
                    .map(|_| {
                        script.idea_counter += 1;
                        idea_json(script.idea_counter)
                    })
                    .collect();
                format!("Here are the concepts.\n```json\n[{}]\n```", ideas.join(","))
            }
            Stage::Reflection => {
                let round = number_after(prompt, "Round ").unwrap_or(2);
                let block = section(prompt, "## Concept\n", "\n\n## Task");
                let mut concept: serde_json::Value =
                    serde_json::from_str(&block).unwrap_or_default();
                if self.converge_at_round.is_some_and(|n| round >= n) {
                    return format!("THOUGHT: nothing left to change. {DONE}\n```json\n{concept}\n```");
                }
                let plot = concept["plot"].as_str().unwrap_or_default().to_string();
                concept["plot"] = format!("{plot} (refined)").into();
                format!("THOUGHT: sharpened the plot.\n```json\n{concept}\n```")
            }
            Stage::Evaluation => {
                let name = line_value(prompt, "Name: ").unwrap_or_default();
                let rating = self.ratings.get(&name).copied().unwrap_or(7);
                format!(
                    "```json\n{{\"emotion\": {r}, \"market\": {r}, \"novelty\": {r}, \"rationale\": \"solid\"}}\n```",
                    r = rating
                )
            }
            Stage::Draft => {
                let name = line_value(prompt, "Name: ").unwrap_or_default();
                format!("# {name}\n\nChapter 1")
            }
            Stage::Critique => {
                let draft = number_after(prompt, "reviewing draft ").unwrap_or(1);
                match self.critique {
                    CritiquePolicy::ResolveAtDraft(n) if draft >= n => DONE.to_string(),
                    _ => format!("Draft {draft}: tighten the ending."),
                }
            }
            Stage::Revise => {
                let current = section(prompt, "## Current draft\n", "\n\n## Critique");
                format!("{current}\n(revised)")
            }
        }
    }
}

#[async_trait]
impl CompletionDriver for ScriptedDriver {
    async fn generate(
        &self,
        request: &GenerateRequest,
    ) -> Result<GenerateResponse, CompletionError> {
        let prompt = request.last_user_text().unwrap_or_default().to_string();
        let stage = Stage::of(&prompt);
        let mut script = self.script.lock().unwrap();

        let count = {
            let count = script.calls.entry(stage).or_insert(0);
            *count += 1;
            *count
        };
        script.prompts.push((stage, prompt.clone()));

        if let Some((cancel_stage, nth, token)) = &script.cancel
            && *cancel_stage == stage
            && *nth == count
        {
            token.cancel();
        }

        if let Some((failing_stage, after, kind)) = &script.failing_after
            && *failing_stage == stage
            && count > *after
        {
            return Err(CompletionError::new(kind.clone()));
        }

        if let Some(pos) = script.failures.iter().position(|(s, _)| *s == stage) {
            let (_, kind) = script.failures.remove(pos);
            return Err(CompletionError::new(kind));
        }

        let text = self.respond(stage, &prompt, &mut script);
        Ok(GenerateResponse::from_text(text))
    }

    fn provider_name(&self) -> &'static str {
        "scripted"
    }

    fn model_name(&self) -> &str {
        "scripted-model"
    }
}

fn idea_json(n: usize) -> String {
    format!(
        r#"{{"name": "idea_{n}", "setting": "Setting number {n}", "plot": "Plot number {n}", "theme": "trust"}}"#
    )
}

fn number_after(text: &str, marker: &str) -> Option<u32> {
    let start = text.find(marker)? + marker.len();
    let digits: String = text[start..]
        .chars()
        .take_while(char::is_ascii_digit)
        .collect();
    digits.parse().ok()
}

fn line_value(text: &str, prefix: &str) -> Option<String> {
    text.lines()
        .find_map(|line| line.strip_prefix(prefix))
        .map(str::to_string)
}

fn section(text: &str, start: &str, end: &str) -> String {
    let Some(begin) = text.find(start) else {
        return String::new();
    };
    let rest = &text[begin + start.len()..];
    rest.find(end)
        .map(|stop| rest[..stop].to_string())
        .unwrap_or_else(|| rest.to_string())
}

/// Source provider returning a fixed document for any identifier.
pub struct StaticSource {
    document: Option<SourceDocument>,
}

impl StaticSource {
    pub fn with_segments(count: usize) -> Self {
        let segments = (0..count)
            .map(|i| format!("Segment {i}: Melos ran on through the heat."))
            .collect();
        Self {
            document: Some(SourceDocument::new(
                "melos.txt",
                "Run, Melos!",
                Some("Osamu Dazai".to_string()),
                segments,
            )),
        }
    }

    /// Provider whose load always fails.
    pub fn unreadable() -> Self {
        Self { document: None }
    }
}

#[async_trait]
impl SourceProvider for StaticSource {
    async fn load(&self, identifier: &str) -> NovelistResult<SourceDocument> {
        self.document.clone().ok_or_else(|| {
            novelist_error::PipelineError::new(novelist_error::PipelineErrorKind::SourceUnreadable(
                identifier.to_string(),
            ))
            .into()
        })
    }
}

/// Configuration with instant retries.
pub fn test_config(num_ideas: u32, max_iterations: u32) -> NovelistConfig {
    let mut config = NovelistConfig::default();
    config.run.num_ideas = num_ideas;
    config.run.max_iterations = max_iterations;
    config.run.workers = 2;
    config.retry = RetryConfig {
        max_attempts: 3,
        initial_backoff_ms: 0,
        max_backoff_ms: 0,
        jitter: false,
    };
    config
}

pub fn concept(ordinal: u32, name: &str) -> Concept {
    Concept::new(
        ConceptId::new(ordinal),
        name,
        format!("Setting of {name}"),
        format!("Plot of {name}"),
        BTreeMap::new(),
        Provenance::new(0, "prompt", "scripted-model"),
    )
}
