//! Condensed rendering of a source document for prompts.

use novelist_core::SourceDocument;

const ELLIPSIS: &str = "…";

/// Title and author header followed by source excerpts within `budget`
/// characters.
///
/// When the whole text fits it is included verbatim. Otherwise every segment
/// contributes an excerpt from its beginning, with the budget shared evenly,
/// so the beginning, middle and end of the work are all represented.
pub fn condense_source(source: &SourceDocument, budget: usize) -> String {
    let mut header = format!("Title: {}", source.title());
    if let Some(author) = source.author() {
        header.push_str(&format!("\nAuthor: {}", author));
    }

    let segments: Vec<&str> = source
        .segments()
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .collect();
    if segments.is_empty() {
        return header;
    }

    let separators = segments.len() - 1;
    let total: usize = segments.iter().map(|s| s.chars().count()).sum::<usize>() + separators * 2;
    if total <= budget {
        return format!("{}\n\n{}", header, segments.join("\n\n"));
    }

    // Budget too small to give every segment a few characters: sample evenly
    let min_share = 16;
    let slots = (budget / min_share).clamp(1, segments.len());
    let chosen: Vec<&str> = (0..slots)
        .map(|i| segments[i * segments.len() / slots])
        .collect();

    let share = (budget.saturating_sub(chosen.len().saturating_sub(1) * 2) / chosen.len()).max(1);
    let excerpts: Vec<String> = chosen.iter().map(|s| excerpt(s, share)).collect();
    format!("{}\n\n{}", header, excerpts.join("\n\n"))
}

/// Source text block used in idea and draft prompts.
///
/// The condensed source, preceded by the model-written summary when one
/// exists.
pub fn source_context(source: &SourceDocument, budget: usize, summary: Option<&str>) -> String {
    let condensed = condense_source(source, budget);
    match summary.map(str::trim).filter(|s| !s.is_empty()) {
        Some(summary) => format!("Summary:\n{}\n\nExcerpts:\n{}", summary, condensed),
        None => condensed,
    }
}

fn excerpt(segment: &str, limit: usize) -> String {
    if segment.chars().count() <= limit {
        return segment.to_string();
    }
    let kept: String = segment.chars().take(limit.saturating_sub(1)).collect();
    format!("{}{}", kept.trim_end(), ELLIPSIS)
}
