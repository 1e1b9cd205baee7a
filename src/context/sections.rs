//! Section formatting and length-budget truncation (spec §4.E).

use crate::memory::MemoryManager;

pub fn matching_entity_summaries(memory: &MemoryManager, query: &str, limit: usize) -> Vec<String> {
    let words: Vec<String> = query.split_whitespace().map(|w| w.to_lowercase()).collect();
    let mut summaries = Vec::new();
    for entity_type in ["person", "organization", "location", "concept"] {
        for entity in memory.entities_by_type(entity_type) {
            let name_lower = entity.name.to_lowercase();
            if words.iter().any(|w| name_lower.contains(w.as_str())) {
                let attrs = entity
                    .attributes
                    .iter()
                    .map(|(k, v)| format!("{k}={v}"))
                    .collect::<Vec<_>>()
                    .join(", ");
                let relationships = entity
                    .relationships
                    .iter()
                    .map(|r| format!("{} -> {}", r.relation, r.entity_id))
                    .collect::<Vec<_>>()
                    .join(", ");
                summaries.push(format!(
                    "{}/{}/Attributes: {}/Relationships: {}",
                    entity.name, entity.entity_type, attrs, relationships
                ));
                if summaries.len() >= limit {
                    return summaries;
                }
            }
        }
    }
    summaries
}

fn bullets(items: &[String]) -> String {
    items.iter().map(|item| format!("- {item}")).collect::<Vec<_>>().join("\n")
}

/// Formats the four sections of spec §4.E, omitting empty ones, then clamps
/// the concatenation to `max_len` by dropping later sections and truncating
/// the last kept section at a sentence/word boundary.
pub fn format_sections(
    recent_insights: &[String],
    historical_data: &[String],
    entities: &[String],
    user_memories: &[String],
) -> String {
    format_sections_impl(recent_insights, historical_data, entities, user_memories, usize::MAX)
}

pub fn format_sections_with_limit(
    recent_insights: &[String],
    historical_data: &[String],
    entities: &[String],
    user_memories: &[String],
    max_len: usize,
) -> String {
    format_sections_impl(recent_insights, historical_data, entities, user_memories, max_len)
}

fn format_sections_impl(
    recent_insights: &[String],
    historical_data: &[String],
    entities: &[String],
    user_memories: &[String],
    max_len: usize,
) -> String {
    let mut sections: Vec<(&str, String)> = Vec::new();
    if !recent_insights.is_empty() {
        sections.push(("Recent Insights", bullets(recent_insights)));
    }
    if !historical_data.is_empty() {
        sections.push(("Historical Data", bullets(historical_data)));
    }
    if !entities.is_empty() {
        sections.push(("Entities", bullets(entities)));
    }
    if !user_memories.is_empty() {
        sections.push(("User memories/preferences", bullets(user_memories)));
    }

    let mut out = String::new();
    for (title, body) in sections {
        let candidate = if out.is_empty() {
            format!("## {title}\n{body}")
        } else {
            format!("{out}\n\n## {title}\n{body}")
        };
        if candidate.len() <= max_len {
            out = candidate;
        } else {
            let remaining = max_len.saturating_sub(if out.is_empty() { 0 } else { out.len() + 2 });
            if remaining == 0 {
                break;
            }
            let header = format!("## {title}\n");
            if header.len() >= remaining {
                break;
            }
            let body_budget = remaining - header.len();
            let truncated_body = truncate_at_boundary(&body, body_budget);
            out = if out.is_empty() {
                format!("{header}{truncated_body}")
            } else {
                format!("{out}\n\n{header}{truncated_body}")
            };
            break;
        }
    }
    out
}

/// Truncates `text` to at most `max_len` bytes, preferring to cut at the
/// last sentence boundary (`.`, `!`, `?`) within budget, else the last word
/// boundary, else a hard byte cut on a char boundary.
fn truncate_at_boundary(text: &str, max_len: usize) -> String {
    if text.len() <= max_len {
        return text.to_string();
    }
    let mut cut = 0;
    for (idx, ch) in text.char_indices() {
        if idx >= max_len {
            break;
        }
        cut = idx + ch.len_utf8();
    }
    let window = &text[..cut];

    if let Some(pos) = window.rfind(['.', '!', '?']) {
        return window[..=pos].to_string();
    }
    if let Some(pos) = window.rfind(char::is_whitespace) {
        return window[..pos].trim_end().to_string();
    }
    window.to_string()
}
