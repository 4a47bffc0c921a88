//! Structured data extraction from model output.
//!
//! Models wrap JSON in prose and code fences, use varying key case, and
//! sometimes return a bare object where an array was requested. Extraction
//! is lenient about all of that and strict about content: concepts need a
//! non-empty setting and plot, scores need all three rubric criteria.

use regex::Regex;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::LazyLock;

static JSON_FENCE: LazyLock<Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(r"(?s)```(?:json|JSON)?\s*\n(.*?)```"));

/// Rubric criteria, in prompt order.
pub const RUBRIC_CRITERIA: [&str; 3] = ["emotion", "market", "novelty"];

/// Extracts the first JSON value from model output.
///
/// Tries fenced code blocks first, then the whole text, then the widest
/// bracketed span.
pub fn extract_json(text: &str) -> Option<Value> {
    if let Ok(fence) = JSON_FENCE.as_ref() {
        for captures in fence.captures_iter(text) {
            if let Ok(value) = serde_json::from_str::<Value>(captures[1].trim()) {
                return Some(value);
            }
        }
    }

    let trimmed = text.trim();
    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        return Some(value);
    }

    for (open, close) in [('[', ']'), ('{', '}')] {
        if let (Some(start), Some(end)) = (trimmed.find(open), trimmed.rfind(close))
            && start < end
            && let Ok(value) = serde_json::from_str::<Value>(&trimmed[start..=end])
        {
            return Some(value);
        }
    }
    None
}

/// Concept fields as parsed from model output, before an id is assigned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConceptCandidate {
    /// Short slug
    pub name: String,
    /// Setting summary
    pub setting: String,
    /// Plot summary
    pub plot: String,
    /// Remaining vision fields
    pub details: BTreeMap<String, String>,
}

impl ConceptCandidate {
    /// Candidate as a flat JSON object, details alongside the core fields.
    pub fn to_json(&self) -> Value {
        let mut object = Map::new();
        object.insert("name".to_string(), Value::String(self.name.clone()));
        object.insert("setting".to_string(), Value::String(self.setting.clone()));
        object.insert("plot".to_string(), Value::String(self.plot.clone()));
        for (key, text) in &self.details {
            object.insert(key.clone(), Value::String(text.clone()));
        }
        Value::Object(object)
    }
}

/// True when `text` contains `marker`, ignoring case.
pub fn contains_marker(text: &str, marker: &str) -> bool {
    text.to_lowercase().contains(&marker.to_lowercase())
}

fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Array(items) => {
            let parts: Vec<String> = items.iter().filter_map(value_text).collect();
            Some(parts.join(", "))
        }
        Value::Object(_) => Some(value.to_string()),
        Value::Null => None,
    }
}

fn field<'a>(object: &'a Map<String, Value>, key: &str) -> Option<&'a Value> {
    object
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(key))
        .map(|(_, v)| v)
}

fn parse_candidate(object: &Map<String, Value>) -> Option<ConceptCandidate> {
    let setting = field(object, "setting").and_then(value_text)?;
    let plot = field(object, "plot").and_then(value_text)?;
    if setting.is_empty() || plot.is_empty() {
        return None;
    }
    let name = field(object, "name")
        .and_then(value_text)
        .filter(|n| !n.is_empty())
        .unwrap_or_default();

    let details = object
        .iter()
        .filter(|(k, _)| {
            !["name", "setting", "plot"]
                .iter()
                .any(|reserved| k.eq_ignore_ascii_case(reserved))
        })
        .filter_map(|(k, v)| {
            value_text(v)
                .filter(|text| !text.is_empty())
                .map(|text| (k.to_lowercase(), text))
        })
        .collect();

    Some(ConceptCandidate {
        name,
        setting,
        plot,
        details,
    })
}

/// Well-formed concept candidates in the value.
///
/// Accepts an array of objects, a single object, or an object wrapping the
/// array under `ideas` or `concepts`. Malformed elements are skipped.
pub fn parse_concepts(value: &Value) -> Vec<ConceptCandidate> {
    match value {
        Value::Array(items) => items
            .iter()
            .filter_map(Value::as_object)
            .filter_map(parse_candidate)
            .collect(),
        Value::Object(object) => {
            for wrapper in ["ideas", "concepts"] {
                if let Some(inner @ Value::Array(_)) = field(object, wrapper) {
                    return parse_concepts(inner);
                }
            }
            parse_candidate(object).into_iter().collect()
        }
        _ => Vec::new(),
    }
}

fn rating(value: &Value) -> Option<u8> {
    let number = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    if !number.is_finite() {
        return None;
    }
    Some(number.round().clamp(1.0, 10.0) as u8)
}

/// Rubric ratings (clamped to 1..=10) and rationale from the value.
///
/// Returns `None` unless every criterion is present and numeric.
pub fn parse_rubric(value: &Value) -> Option<(BTreeMap<String, u8>, String)> {
    let object = match value {
        Value::Object(object) => object,
        Value::Array(items) => items.first()?.as_object()?,
        _ => return None,
    };

    let mut criteria = BTreeMap::new();
    for criterion in RUBRIC_CRITERIA {
        let score = field(object, criterion).and_then(rating)?;
        criteria.insert(criterion.to_string(), score);
    }

    let rationale = ["rationale", "reason", "thought"]
        .iter()
        .find_map(|key| field(object, key).and_then(value_text))
        .unwrap_or_default();

    Some((criteria, rationale))
}
