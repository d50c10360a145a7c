//! Tool registry validation with edit-distance suggestions.

use std::collections::BTreeSet;
use std::sync::OnceLock;

use regex_lite::Regex;

use super::{step_path, ErrorType, ValidationContext, ValidationError};

const MAX_SUGGESTION_DISTANCE: usize = 3;
const MAX_SUGGESTIONS: usize = 3;

fn tool_name_regex() -> &'static Regex {
    static TOOL_NAME: OnceLock<Regex> = OnceLock::new();
    TOOL_NAME.get_or_init(|| Regex::new(r"^[a-z][a-z0-9_]*$").expect("valid regex"))
}

/// Check every step's tool against the known and enabled sets.
pub fn validate_tools(ctx: &ValidationContext) -> Vec<ValidationError> {
    let mut findings = Vec::new();

    for (i, step) in ctx.workflow.steps.iter().enumerate() {
        let path = step_path(i, "tool");
        let tool = step.tool.as_str();

        if !ctx.known_tools.contains(tool) {
            let mut err = ValidationError::error(
                ErrorType::Tool,
                &path,
                format!("Unknown tool '{}' in step '{}'", tool, step.name),
            );
            if let Some(suggestion) = suggest_tools(tool, &ctx.enabled_tools) {
                err = err.with_suggestion(suggestion);
            }
            findings.push(err);
        } else if !ctx.enabled_tools.contains(tool) {
            findings.push(
                ValidationError::warning(
                    ErrorType::Tool,
                    &path,
                    format!("Tool '{}' is disabled in configuration", tool),
                )
                .with_suggestion("Enable the tool or pick another one"),
            );
        }

        if !tool_name_regex().is_match(tool) {
            findings.push(ValidationError::warning(
                ErrorType::Tool,
                &path,
                format!("Tool name '{}' has an unusual format", tool),
            ));
        }
    }

    findings
}

/// Suggest up to three enabled tools within edit distance 3, closest first.
/// Falls back to the single closest enabled tool when none is that near.
pub fn suggest_tools(name: &str, enabled: &BTreeSet<String>) -> Option<String> {
    let mut ranked: Vec<(usize, &str)> = enabled
        .iter()
        .map(|candidate| (levenshtein(name, candidate), candidate.as_str()))
        .collect();
    ranked.sort();

    let near: Vec<&str> = ranked
        .iter()
        .filter(|(d, _)| *d <= MAX_SUGGESTION_DISTANCE)
        .take(MAX_SUGGESTIONS)
        .map(|(_, c)| *c)
        .collect();

    if !near.is_empty() {
        return Some(format!("Did you mean: {}?", near.join(", ")));
    }
    ranked
        .first()
        .map(|(_, c)| format!("Closest enabled tool: {}", c))
}

/// Levenshtein edit distance over characters.
pub fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];
    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j] + cost).min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::ToolRegistry;
    use crate::workflow::{parse_workflow, WorkflowFormat};

    fn set(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_levenshtein() {
        assert_eq!(levenshtein("", "abc"), 3);
        assert_eq!(levenshtein("kitten", "sitting"), 3);
        assert_eq!(levenshtein("gemini", "gemini"), 0);
        assert_eq!(levenshtein("llm", "lm"), 1);
    }

    #[test]
    fn test_suggests_near_tools_in_distance_order() {
        let enabled = set(&["search", "serach_web", "llm", "summarize"]);
        let suggestion = suggest_tools("serch", &enabled).unwrap();
        assert_eq!(suggestion, "Did you mean: search?");
        let suggestion = suggest_tools("lm", &enabled).unwrap();
        assert_eq!(suggestion, "Did you mean: llm?");
    }

    #[test]
    fn test_far_name_gets_closest_tool() {
        let enabled = set(&["gemini", "llm", "search"]);
        let suggestion = suggest_tools("gemini_bathtub", &enabled).unwrap();
        assert_eq!(suggestion, "Closest enabled tool: gemini");
        assert!(suggest_tools("x", &BTreeSet::new()).is_none());
    }

    #[test]
    fn test_unknown_disabled_and_unusual_tools() {
        let workflow = parse_workflow(
            r#"
name: t
steps:
  - name: a
    tool: gemini_bathtub
  - name: b
    tool: legacy
  - name: c
    tool: Search-Web
"#,
            WorkflowFormat::Yaml,
        )
        .unwrap();
        let registry = ToolRegistry::new(["gemini", "legacy", "Search-Web"]).with_disabled(["legacy"]);
        let findings = validate_tools(&ValidationContext::new(workflow, &registry));

        assert_eq!(findings.len(), 3);
        assert!(findings[0].is_blocking());
        assert!(findings[0].suggestion.as_deref().unwrap().contains("gemini"));
        assert!(!findings[1].is_blocking());
        assert!(findings[1].message.contains("disabled"));
        assert!(!findings[2].is_blocking());
        assert!(findings[2].message.contains("unusual"));
    }
}
