//! System-prompt template rendering with token-budget enforcement
//! (spec §4.G step 2): truncate variables lowest-priority-first down to a
//! minimum-token floor, each cut proportionally to the current overflow,
//! then binary-search-truncate the whole rendered text as a last resort.

use crate::utils::truncate::{truncate_text, TruncationPolicy};
use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct PromptVariable {
    pub name: String,
    pub value: String,
    /// Higher survives truncation longest; lower is shrunk first.
    pub priority: u8,
}

impl PromptVariable {
    pub fn new(name: impl Into<String>, value: impl Into<String>, priority: u8) -> Self {
        Self { name: name.into(), value: value.into(), priority }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PromptBudget {
    pub min_tokens_per_variable: usize,
}

impl Default for PromptBudget {
    fn default() -> Self {
        Self { min_tokens_per_variable: 20 }
    }
}

pub fn render_with_budget(variables: &[PromptVariable], max_tokens: usize, count_tokens: impl Fn(&str) -> usize) -> String {
    let rendered = render(variables, &HashMap::new());
    if max_tokens == 0 || count_tokens(&rendered) <= max_tokens {
        return rendered;
    }

    let budget = PromptBudget::default();
    let mut order: Vec<&PromptVariable> = variables.iter().collect();
    order.sort_by_key(|v| v.priority);

    let mut overrides: HashMap<String, String> = HashMap::new();
    for var in order {
        let current_total = count_tokens(&render(variables, &overrides));
        if current_total <= max_tokens {
            break;
        }
        let current_value = overrides.get(&var.name).cloned().unwrap_or_else(|| var.value.clone());
        let current_tokens = count_tokens(&current_value);
        if current_tokens <= budget.min_tokens_per_variable {
            continue;
        }

        let overflow = current_total - max_tokens;
        let max_reduction = current_tokens - budget.min_tokens_per_variable;
        let target_reduction = overflow.min(max_reduction);
        let target_tokens = current_tokens.saturating_sub(target_reduction).max(budget.min_tokens_per_variable);
        let truncated = truncate_text(&current_value, TruncationPolicy::Tokens(target_tokens));
        overrides.insert(var.name.clone(), truncated);
    }

    let shrunk = render(variables, &overrides);
    if count_tokens(&shrunk) <= max_tokens {
        return shrunk;
    }

    binary_search_truncate(&shrunk, max_tokens, count_tokens)
}

fn render(variables: &[PromptVariable], overrides: &HashMap<String, String>) -> String {
    let get = |name: &str| -> String {
        overrides
            .get(name)
            .cloned()
            .or_else(|| variables.iter().find(|v| v.name == name).map(|v| v.value.clone()))
            .unwrap_or_default()
    };
    let role = get("role");
    let goal = get("goal");
    let backstory = get("backstory");
    let task = get("task");
    let expected_output = get("expected_output");
    let context = get("context");

    let backstory_section = if backstory.is_empty() { String::new() } else { format!("Backstory: {backstory}\n\n") };
    let expected_output_section =
        if expected_output.is_empty() { String::new() } else { format!("Expected output: {expected_output}\n\n") };

    format!("You are acting as: {role}\n\nYour goal: {goal}\n\n{backstory_section}Task: {task}\n\n{expected_output_section}Context:\n{context}\n")
}

/// Binary-searches the largest prefix+suffix byte budget (via
/// `truncate_text`) whose result fits within `max_tokens`.
fn binary_search_truncate(text: &str, max_tokens: usize, count_tokens: impl Fn(&str) -> usize) -> String {
    let mut low = 0usize;
    let mut high = text.len();
    let mut best = truncate_text(text, TruncationPolicy::Bytes(0));
    loop {
        let mid = low + (high - low) / 2;
        let candidate = truncate_text(text, TruncationPolicy::Bytes(mid));
        if count_tokens(&candidate) <= max_tokens {
            best = candidate;
            if mid >= high {
                break;
            }
            low = mid + 1;
        } else {
            if mid == 0 {
                break;
            }
            high = mid - 1;
        }
        if low > high {
            break;
        }
    }
    best
}
