//! Interpolation validation: every `${...}` must resolve, and resolve to
//! something that has already run.

use std::collections::HashSet;
use std::sync::OnceLock;

use regex_lite::Regex;

use super::tools::levenshtein;
use super::{step_path, ErrorType, ValidationContext, ValidationError};
use crate::workflow::{InputValue, Reference, SaveTarget, StepInput, Template, Workflow};

/// Names always bound at runtime.
pub const RUNTIME_VARIABLES: &[&str] = &["input", "timestamp", "query"];

fn snake_case_regex() -> &'static Regex {
    static SNAKE_CASE: OnceLock<Regex> = OnceLock::new();
    SNAKE_CASE.get_or_init(|| Regex::new(r"^[a-z][a-z0-9_]*$").expect("valid regex"))
}

/// Check references in inputs, conditions and `output.saveToFile`, the
/// existence of `dependsOn`/`loadFiles` entries, and redundant file loads.
///
/// Ordering of `dependsOn`/`loadFiles` entries is left to the dependency
/// validator so each problem is reported once.
pub fn validate_interpolation(ctx: &ValidationContext) -> Vec<ValidationError> {
    let workflow = &ctx.workflow;
    let mut findings = Vec::new();

    for (i, step) in workflow.steps.iter().enumerate() {
        let checker = ReferenceChecker {
            workflow,
            position: i,
            owner: &step.name,
        };

        if let Some(input) = &step.input {
            match input {
                StepInput::Literal(t) => checker.check_template(t, &step_path(i, "input"), &mut findings),
                StepInput::Structured(map) => {
                    for (key, value) in map {
                        let path = step_path(i, &format!("input/{}", key));
                        match value {
                            InputValue::Text(t) => checker.check_template(t, &path, &mut findings),
                            InputValue::StepRef(target) => {
                                checker.check_step_ref(target, &path, &mut findings)
                            }
                            InputValue::Number(_) | InputValue::Bool(_) => {}
                        }
                    }
                }
            }
        }
        if let Some(when) = &step.when {
            checker.check_template(when, &step_path(i, "when"), &mut findings);
        }
        if let Some(expr) = step.condition.as_ref().and_then(|c| c.if_expr.as_ref()) {
            checker.check_template(expr, &step_path(i, "condition/if"), &mut findings);
        }

        check_entries_exist(workflow, &step.depends_on, i, "dependsOn", &mut findings);
        check_entries_exist(workflow, &step.load_files, i, "loadFiles", &mut findings);
        check_redundant_loads(workflow, i, &mut findings);
    }

    if let Some(SaveTarget::Path(template)) =
        workflow.output.as_ref().and_then(|o| o.save_to_file.as_ref())
    {
        let checker = ReferenceChecker {
            workflow,
            position: workflow.steps.len(),
            owner: "output",
        };
        checker.check_template(template, "/output/saveToFile", &mut findings);
    }

    findings
}

/// Resolves references as seen from one position in the step sequence.
struct ReferenceChecker<'a> {
    workflow: &'a Workflow,
    /// References must point strictly before this index
    position: usize,
    owner: &'a str,
}

impl ReferenceChecker<'_> {
    fn check_template(&self, template: &Template, path: &str, findings: &mut Vec<ValidationError>) {
        let mut seen = HashSet::new();
        for reference in template.references() {
            if seen.insert(reference.raw.as_str()) {
                self.check_reference(reference, path, findings);
            }
        }
    }

    fn check_reference(&self, reference: &Reference, path: &str, findings: &mut Vec<ValidationError>) {
        let token = reference.token();

        if let Some(field) = &reference.field {
            let Some(target) = self.workflow.step_index(&reference.head) else {
                let mut err = ValidationError::error(
                    ErrorType::Interpolation,
                    path,
                    format!("Reference {} points to undefined step '{}'", token, reference.head),
                );
                if let Some(close) = self.closest_step(&reference.head) {
                    err = err.with_suggestion(format!("Did you mean '{}'?", close));
                }
                findings.push(err);
                return;
            };
            self.check_order(target, &token, path, findings);
            if field != "output" {
                findings.push(
                    ValidationError::warning(
                        ErrorType::Interpolation,
                        path,
                        format!(
                            "Reference {} uses field '{}'; only '.output' is guaranteed to resolve",
                            token, field
                        ),
                    )
                    .with_suggestion(format!("Use ${{{}.output}}", reference.head)),
                );
            }
            return;
        }

        let name = reference.head.as_str();
        if let Some(target) = self.workflow.step_index(name) {
            self.check_order(target, &token, path, findings);
            return;
        }

        let resolved = if self.workflow.variables.contains_key(name) || RUNTIME_VARIABLES.contains(&name) {
            true
        } else if let Some(owner) = self.workflow.output_variable_owner(name) {
            self.check_order(owner, &token, path, findings);
            true
        } else {
            false
        };

        if !resolved {
            let mut err = ValidationError::error(
                ErrorType::Interpolation,
                path,
                format!("Unresolved reference {}", token),
            );
            if let Some(close) = self.closest_name(name) {
                err = err.with_suggestion(format!("Did you mean '{}'?", close));
            } else {
                err = err.with_suggestion(format!(
                    "Declare '{}' under variables or as a step's output.variable",
                    name
                ));
            }
            findings.push(err);
        }

        if !snake_case_regex().is_match(name) {
            findings.push(ValidationError::warning(
                ErrorType::Interpolation,
                path,
                format!("Variable reference {} is not snake_case", token),
            ));
        }
    }

    fn check_step_ref(&self, target: &str, path: &str, findings: &mut Vec<ValidationError>) {
        match self.workflow.step_index(target) {
            Some(index) => self.check_order(index, target, path, findings),
            None => findings.push(ValidationError::error(
                ErrorType::Interpolation,
                path,
                format!("previousStep names undefined step '{}'", target),
            )),
        }
    }

    fn check_order(&self, target: usize, token: &str, path: &str, findings: &mut Vec<ValidationError>) {
        if target < self.position {
            return;
        }
        let target_name = &self.workflow.steps[target].name;
        let message = if target == self.position {
            format!("Step '{}' references its own output via {}", self.owner, token)
        } else {
            format!(
                "'{}' references {} but step '{}' runs later",
                self.owner, token, target_name
            )
        };
        findings.push(
            ValidationError::error(ErrorType::Interpolation, path, message)
                .with_suggestion(format!("Move '{}' before '{}'", target_name, self.owner)),
        );
    }

    fn closest_step(&self, name: &str) -> Option<&str> {
        closest(name, self.workflow.steps.iter().map(|s| s.name.as_str()))
    }

    fn closest_name(&self, name: &str) -> Option<&str> {
        let candidates = self
            .workflow
            .variables
            .keys()
            .map(String::as_str)
            .chain(self.workflow.steps.iter().filter_map(|s| s.output_variable()))
            .chain(RUNTIME_VARIABLES.iter().copied());
        closest(name, candidates)
    }
}

fn closest<'a>(name: &str, candidates: impl Iterator<Item = &'a str>) -> Option<&'a str> {
    candidates
        .map(|c| (levenshtein(name, c), c))
        .filter(|(d, _)| *d > 0 && *d <= 2)
        .min()
        .map(|(_, c)| c)
}

fn check_entries_exist(
    workflow: &Workflow,
    entries: &[String],
    position: usize,
    field: &str,
    findings: &mut Vec<ValidationError>,
) {
    for (j, entry) in entries.iter().enumerate() {
        if workflow.step_index(entry).is_none() {
            findings.push(ValidationError::error(
                ErrorType::Dependency,
                step_path(position, &format!("{}/{}", field, j)),
                format!("{} entry '{}' is not a declared step", field, entry),
            ));
        }
    }
}

/// A `loadFiles` entry whose `output.variable` is already interpolated in the
/// same step's input is loaded for nothing.
///
/// Matching is by `output.variable` only; a raw `${step}` reference to the
/// loaded step is not treated as redundant.
fn check_redundant_loads(workflow: &Workflow, position: usize, findings: &mut Vec<ValidationError>) {
    let step = &workflow.steps[position];
    if step.load_files.is_empty() {
        return;
    }
    let interpolated: HashSet<&str> = step
        .input_references()
        .into_iter()
        .filter(|r| !r.is_dotted())
        .map(|r| r.head.as_str())
        .collect();

    for (j, entry) in step.load_files.iter().enumerate() {
        let Some(variable) = workflow.get_step(entry).and_then(|s| s.output_variable()) else {
            continue;
        };
        if interpolated.contains(variable) {
            findings.push(
                ValidationError::warning(
                    ErrorType::Redundancy,
                    step_path(position, &format!("loadFiles/{}", j)),
                    format!(
                        "'{}' is loaded from file but ${{{}}} is already interpolated in the input",
                        entry, variable
                    ),
                )
                .with_suggestion(format!("Remove '{}' from loadFiles", entry)),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::ToolRegistry;
    use crate::workflow::{parse_workflow, WorkflowFormat};

    fn check(yaml: &str) -> Vec<ValidationError> {
        let workflow = parse_workflow(yaml, WorkflowFormat::Yaml).unwrap();
        let ctx = ValidationContext::new(workflow, &ToolRegistry::new(["llm", "search"]));
        validate_interpolation(&ctx)
    }

    #[test]
    fn test_earlier_step_output_resolves() {
        let findings = check(
            r#"
name: t
variables:
  audience: execs
steps:
  - name: fetch
    tool: search
    input: "${query} at ${timestamp}"
  - name: summarize
    tool: llm
    input: "For ${audience}: ${fetch.output} / ${fetch}"
"#,
        );
        assert!(findings.is_empty(), "{:?}", findings);
    }

    #[test]
    fn test_later_step_reference_is_error() {
        let findings = check(
            r#"
name: t
steps:
  - name: early
    tool: llm
    input: "${late.output}"
  - name: late
    tool: llm
"#,
        );
        assert_eq!(findings.len(), 1);
        assert!(findings[0].is_blocking());
        assert_eq!(findings[0].path, "/steps/0/input");
        assert!(findings[0].message.contains("runs later"));
    }

    #[test]
    fn test_undefined_step_is_error_with_suggestion() {
        let findings = check(
            r#"
name: t
steps:
  - name: fetch
    tool: search
  - name: use
    tool: llm
    input: "${fetc.output}"
"#,
        );
        assert_eq!(findings.len(), 1);
        assert!(findings[0].message.contains("undefined step 'fetc'"));
        assert_eq!(findings[0].suggestion.as_deref(), Some("Did you mean 'fetch'?"));
    }

    #[test]
    fn test_non_output_field_is_warning() {
        let findings = check(
            r#"
name: t
steps:
  - name: a
    tool: llm
  - name: b
    tool: llm
    input: "${a.result}"
"#,
        );
        assert_eq!(findings.len(), 1);
        assert!(!findings[0].is_blocking());
    }

    #[test]
    fn test_unresolved_variable_and_style() {
        let findings = check(
            r#"
name: t
steps:
  - name: a
    tool: llm
    input: "${TopicName}"
"#,
        );
        assert_eq!(findings.len(), 2);
        assert!(findings[0].is_blocking());
        assert!(findings[0].message.contains("Unresolved"));
        assert!(!findings[1].is_blocking());
    }

    #[test]
    fn test_output_variable_must_be_earlier() {
        let findings = check(
            r#"
name: t
steps:
  - name: a
    tool: llm
    input: "${notes}"
  - name: b
    tool: llm
    output:
      variable: notes
"#,
        );
        assert_eq!(findings.len(), 1);
        assert!(findings[0].message.contains("runs later"));
    }

    #[test]
    fn test_conditions_and_save_path_are_checked() {
        let findings = check(
            r#"
name: t
steps:
  - name: a
    tool: llm
    when: "${ghost} == \"x\""
    condition:
      if: "${a.output} != \"\""
output:
  saveToFile: "reports/${a}-${missing}.md"
"#,
        );
        let paths: Vec<_> = findings.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(
            paths,
            vec!["/steps/0/when", "/steps/0/condition/if", "/output/saveToFile"]
        );
    }

    #[test]
    fn test_undefined_load_and_dependency_entries() {
        let findings = check(
            r#"
name: t
steps:
  - name: a
    tool: llm
    dependsOn: [nope]
    loadFiles: [gone]
"#,
        );
        assert_eq!(findings.len(), 2);
        assert!(findings.iter().all(|f| f.error_type == ErrorType::Dependency));
        assert_eq!(findings[0].path, "/steps/0/dependsOn/0");
        assert_eq!(findings[1].path, "/steps/0/loadFiles/0");
    }

    #[test]
    fn test_redundant_load_warning() {
        let findings = check(
            r#"
name: t
steps:
  - name: research
    tool: llm
    saveToFile: true
    output:
      variable: findings
  - name: write
    tool: llm
    loadFiles: [research]
    input: "Write from ${findings}"
"#,
        );
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].error_type, ErrorType::Redundancy);
        assert_eq!(findings[0].path, "/steps/1/loadFiles/0");
    }

    #[test]
    fn test_previous_step_must_exist() {
        let findings = check(
            r#"
name: t
steps:
  - name: a
    tool: llm
    input:
      previousStep: nobody
"#,
        );
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].path, "/steps/0/input/previousStep");
    }
}
