//! Syntax validation: parse the text and check the workflow shape.

use std::collections::HashMap;
use std::sync::OnceLock;

use regex_lite::Regex;
use serde_json::Value;

use super::{step_path, ErrorType, ValidationError};
use crate::workflow::{parse_document, workflow_from_document, Workflow, WorkflowFormat};

fn name_regex() -> &'static Regex {
    static NAME_REGEX: OnceLock<Regex> = OnceLock::new();
    NAME_REGEX.get_or_init(|| Regex::new(r"^[a-z][a-z0-9_-]*$").expect("valid regex"))
}

/// Result of syntax validation.
///
/// `workflow` is `None` whenever a blocking finding was emitted; the other
/// validators need a well-formed workflow to run.
#[derive(Debug)]
pub struct SyntaxOutcome {
    pub workflow: Option<Workflow>,
    pub findings: Vec<ValidationError>,
}

impl SyntaxOutcome {
    fn failed(findings: Vec<ValidationError>) -> Self {
        Self {
            workflow: None,
            findings,
        }
    }
}

/// Parse `text` and check required fields, step-name uniqueness and naming
/// conventions. Never returns `Err`: parse failures become syntax errors.
pub fn validate_syntax(text: &str, format: WorkflowFormat) -> SyntaxOutcome {
    let document = match parse_document(text, format) {
        Ok(doc) => doc,
        Err(e) => {
            return SyntaxOutcome::failed(vec![ValidationError::error(
                ErrorType::Syntax,
                "",
                e.to_string(),
            )])
        }
    };

    let shape = check_shape(&document);
    if !shape.is_empty() {
        return SyntaxOutcome::failed(shape);
    }

    let workflow = match workflow_from_document(document) {
        Ok(w) => w,
        Err(e) => {
            return SyntaxOutcome::failed(vec![ValidationError::error(
                ErrorType::Syntax,
                "",
                e.to_string(),
            )])
        }
    };

    let mut findings = Vec::new();
    check_unique_names(&workflow, &mut findings);
    check_naming(&workflow, &mut findings);

    if workflow.steps.is_empty() {
        findings.push(ValidationError::warning(
            ErrorType::Syntax,
            "/steps",
            "Workflow has no steps",
        ));
    }

    if findings.iter().any(|f| f.is_blocking()) {
        SyntaxOutcome::failed(findings)
    } else {
        SyntaxOutcome {
            workflow: Some(workflow),
            findings,
        }
    }
}

fn check_shape(document: &Value) -> Vec<ValidationError> {
    let Some(root) = document.as_object() else {
        return vec![ValidationError::error(
            ErrorType::Syntax,
            "",
            "Workflow definition must be a mapping",
        )];
    };

    let mut findings = Vec::new();
    match root.get("name") {
        None | Some(Value::Null) => findings.push(ValidationError::error(
            ErrorType::Syntax,
            "/name",
            "Missing required field: name",
        )),
        Some(Value::String(_)) => {}
        Some(_) => findings.push(ValidationError::error(
            ErrorType::Syntax,
            "/name",
            "Field 'name' must be a string",
        )),
    }
    match root.get("steps") {
        None | Some(Value::Null) => findings.push(ValidationError::error(
            ErrorType::Syntax,
            "/steps",
            "Missing required field: steps",
        )),
        Some(Value::Array(_)) => {}
        Some(_) => findings.push(ValidationError::error(
            ErrorType::Syntax,
            "/steps",
            "Field 'steps' must be a sequence",
        )),
    }
    findings
}

fn check_unique_names(workflow: &Workflow, findings: &mut Vec<ValidationError>) {
    let mut first_seen: HashMap<&str, usize> = HashMap::new();
    for (i, step) in workflow.steps.iter().enumerate() {
        if let Some(&first) = first_seen.get(step.name.as_str()) {
            findings.push(ValidationError::error(
                ErrorType::Syntax,
                step_path(i, "name"),
                format!(
                    "Duplicate step name '{}' (first declared at step {})",
                    step.name, first
                ),
            ));
        } else {
            first_seen.insert(&step.name, i);
        }
    }
}

fn check_naming(workflow: &Workflow, findings: &mut Vec<ValidationError>) {
    let re = name_regex();
    for (i, step) in workflow.steps.iter().enumerate() {
        if !re.is_match(&step.name) {
            findings.push(
                ValidationError::warning(
                    ErrorType::Syntax,
                    step_path(i, "name"),
                    format!("Step name '{}' does not follow naming conventions", step.name),
                )
                .with_suggestion("Use lowercase letters, digits, '_' or '-', starting with a letter"),
            );
        }
    }
    for name in workflow.variables.keys() {
        if !re.is_match(name) {
            findings.push(ValidationError::warning(
                ErrorType::Syntax,
                format!("/variables/{}", name),
                format!("Variable name '{}' does not follow naming conventions", name),
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn yaml(text: &str) -> SyntaxOutcome {
        validate_syntax(text, WorkflowFormat::Yaml)
    }

    #[test]
    fn test_valid_workflow_parses() {
        let outcome = yaml("name: ok\nsteps:\n  - name: a\n    tool: llm\n");
        assert!(outcome.workflow.is_some());
        assert!(outcome.findings.is_empty());
    }

    #[test]
    fn test_missing_name_and_steps() {
        let outcome = yaml("description: nothing here\n");
        assert!(outcome.workflow.is_none());
        let paths: Vec<_> = outcome.findings.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["/name", "/steps"]);
        assert!(outcome.findings.iter().all(|f| f.error_type == ErrorType::Syntax));
    }

    #[test]
    fn test_steps_must_be_sequence() {
        let outcome = yaml("name: x\nsteps:\n  a: b\n");
        assert!(outcome.workflow.is_none());
        assert!(outcome.findings[0].message.contains("sequence"));
    }

    #[test]
    fn test_unparseable_text_is_finding_not_panic() {
        let outcome = validate_syntax("{\"name\": ", WorkflowFormat::Json);
        assert!(outcome.workflow.is_none());
        assert!(outcome.findings[0].message.contains("Invalid JSON"));
    }

    #[test]
    fn test_step_missing_tool() {
        let outcome = yaml("name: x\nsteps:\n  - name: a\n");
        assert!(outcome.workflow.is_none());
        assert!(outcome.findings[0].message.contains("tool"));
    }

    #[test]
    fn test_duplicate_step_names() {
        let outcome = yaml(
            "name: x\nsteps:\n  - name: a\n    tool: llm\n  - name: a\n    tool: llm\n",
        );
        assert!(outcome.workflow.is_none());
        assert_eq!(outcome.findings.len(), 1);
        assert_eq!(outcome.findings[0].path, "/steps/1/name");
    }

    #[test]
    fn test_naming_warnings_do_not_block() {
        let outcome = yaml(
            "name: x\nvariables:\n  TopicName: q\nsteps:\n  - name: FetchData\n    tool: llm\n",
        );
        assert!(outcome.workflow.is_some());
        assert_eq!(outcome.findings.len(), 2);
        assert!(outcome.findings.iter().all(|f| !f.is_blocking()));
        assert_eq!(outcome.findings[1].path, "/variables/TopicName");
    }
}
