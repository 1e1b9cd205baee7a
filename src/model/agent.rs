//! Agent identity and behavior (spec §3 "Agent").

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Unevaluated role/goal/backstory templates plus the resolved identity of
/// one agent within a crew. The original template strings are preserved so
/// copies can be re-interpolated against a different variables mapping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    pub id: String,
    role_template: String,
    goal_template: String,
    backstory_template: Option<String>,
    pub llm_ref: String,
    pub tool_refs: Vec<String>,
    pub max_iterations: usize,
    pub memory_enabled: bool,
    pub allow_delegation: bool,
    pub max_rpm: Option<u32>,
}

impl Agent {
    pub fn new(id: impl Into<String>, role: impl Into<String>, goal: impl Into<String>, llm_ref: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role_template: role.into(),
            goal_template: goal.into(),
            backstory_template: None,
            llm_ref: llm_ref.into(),
            tool_refs: Vec::new(),
            max_iterations: 15,
            memory_enabled: true,
            allow_delegation: false,
            max_rpm: None,
        }
    }

    pub fn with_backstory(mut self, backstory: impl Into<String>) -> Self {
        self.backstory_template = Some(backstory.into());
        self
    }

    pub fn with_tools(mut self, tool_refs: Vec<String>) -> Self {
        self.tool_refs = tool_refs;
        self
    }

    pub fn with_delegation(mut self, allow: bool) -> Self {
        self.allow_delegation = allow;
        self
    }

    /// Interpolate `{{var}}` placeholders in the role/goal/backstory templates
    /// against `variables`, leaving the originals untouched on `self` so a
    /// clone can be re-interpolated later with a different mapping.
    pub fn interpolate(&self, variables: &HashMap<String, String>) -> InterpolatedAgent {
        InterpolatedAgent {
            id: self.id.clone(),
            role: interpolate_template(&self.role_template, variables),
            goal: interpolate_template(&self.goal_template, variables),
            backstory: self
                .backstory_template
                .as_ref()
                .map(|b| interpolate_template(b, variables)),
        }
    }

    pub fn role_template(&self) -> &str {
        &self.role_template
    }

    pub fn goal_template(&self) -> &str {
        &self.goal_template
    }
}

/// Role/goal/backstory after variable substitution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterpolatedAgent {
    pub id: String,
    pub role: String,
    pub goal: String,
    pub backstory: Option<String>,
}

pub fn interpolate_template(template: &str, variables: &HashMap<String, String>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    loop {
        match rest.find("{{") {
            None => {
                out.push_str(rest);
                break;
            }
            Some(start) => {
                out.push_str(&rest[..start]);
                let after = &rest[start + 2..];
                match after.find("}}") {
                    None => {
                        out.push_str(&rest[start..]);
                        break;
                    }
                    Some(end) => {
                        let key = after[..end].trim();
                        if let Some(value) = variables.get(key) {
                            out.push_str(value);
                        } else {
                            out.push_str(&rest[start..start + 4 + end]);
                        }
                        rest = &after[end + 2..];
                    }
                }
            }
        }
    }
    out
}

/// Validates that agent ids are unique within a crew (spec §3 invariant).
pub fn validate_unique_ids(agents: &[Agent]) -> Result<(), crate::error::CoreError> {
    let mut seen = std::collections::HashSet::new();
    for agent in agents {
        if !seen.insert(agent.id.as_str()) {
            return Err(crate::error::CoreError::validation(format!(
                "duplicate agent id: {}",
                agent.id
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interpolates_known_variables_and_preserves_unknown() {
        let mut vars = HashMap::new();
        vars.insert("topic".to_string(), "rust".to_string());
        let agent = Agent::new("a1", "Researcher of {{topic}}", "Study {{topic}} and {{missing}}", "gpt");
        let resolved = agent.interpolate(&vars);
        assert_eq!(resolved.role, "Researcher of rust");
        assert_eq!(resolved.goal, "Study rust and {{missing}}");
        // original template preserved for re-interpolation
        assert_eq!(agent.role_template(), "Researcher of {{topic}}");
    }

    #[test]
    fn rejects_duplicate_ids() {
        let agents = vec![
            Agent::new("a1", "r", "g", "llm"),
            Agent::new("a1", "r2", "g2", "llm"),
        ];
        assert!(validate_unique_ids(&agents).is_err());
    }
}
