//! Aggregate validator.

use std::path::Path;

use tracing::debug;

use super::{
    validate_dependencies, validate_interpolation, validate_output_usage, validate_syntax,
    validate_tools, SourceMap, ValidationContext, ValidationReport,
};
use crate::error::Result;
use crate::tools::ToolRegistry;
use crate::workflow::WorkflowFormat;

/// Runs syntax validation, then the four structural validators.
#[derive(Debug, Clone)]
pub struct WorkflowValidator {
    registry: ToolRegistry,
}

impl WorkflowValidator {
    pub fn new(registry: ToolRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Validate workflow text.
    ///
    /// Syntax failures end validation early with only syntax findings.
    /// Otherwise findings come back in a fixed order (syntax warnings,
    /// interpolation, dependency, tool, output usage), so validating the
    /// same text twice gives identical reports.
    pub fn validate(&self, text: &str, format: WorkflowFormat) -> ValidationReport {
        let syntax = validate_syntax(text, format);
        let Some(workflow) = syntax.workflow else {
            debug!(errors = syntax.findings.len(), "Workflow failed syntax validation");
            return ValidationReport::from_findings(syntax.findings, None);
        };

        let ctx = ValidationContext::new(workflow, &self.registry)
            .with_source_map(SourceMap::scan(text));

        let mut findings = syntax.findings;
        findings.extend(validate_interpolation(&ctx));
        findings.extend(validate_dependencies(&ctx));
        findings.extend(validate_tools(&ctx));
        findings.extend(validate_output_usage(&ctx));

        let report = ValidationReport::from_findings(findings, Some(ctx.workflow));
        debug!(
            valid = report.valid,
            errors = report.errors.len(),
            warnings = report.warnings.len(),
            "Workflow validated"
        );
        report
    }

    /// Read and validate a workflow file; the format follows the extension.
    pub fn validate_file(&self, path: &Path) -> Result<ValidationReport> {
        let text = std::fs::read_to_string(path)?;
        Ok(self.validate(&text, WorkflowFormat::from_path(path)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::ErrorType;

    fn validator() -> WorkflowValidator {
        WorkflowValidator::new(ToolRegistry::new(["search", "llm", "gemini", "summarize"]))
    }

    const LINEAR: &str = r#"
name: linear
steps:
  - name: fetch
    tool: search
    input: "${query}"
  - name: summarize
    tool: llm
    input: "${fetch.output}"
"#;

    #[test]
    fn test_linear_workflow_is_valid() {
        let report = validator().validate(LINEAR, WorkflowFormat::Yaml);
        assert!(report.valid, "{:?}", report.errors);
        assert!(report.errors.is_empty());
        let validated = report.into_validated().unwrap();
        assert_eq!(validated.steps[0].name, "fetch");
    }

    #[test]
    fn test_cycle_is_dependency_error_naming_both_steps() {
        let report = validator().validate(
            r#"
name: cyc
steps:
  - name: a
    tool: llm
    dependsOn: [b]
  - name: b
    tool: llm
    dependsOn: [a]
"#,
            WorkflowFormat::Yaml,
        );
        assert!(!report.valid);
        let deps = report.of_type(ErrorType::Dependency);
        assert_eq!(deps.len(), 1);
        assert!(deps[0].message.contains('a') && deps[0].message.contains('b'));
        assert!(deps[0].message.contains("a → b"));
    }

    #[test]
    fn test_unknown_tool_suggests_nearest() {
        let report = validator().validate(
            "name: t\nsteps:\n  - name: ask\n    tool: gemini_bathtub\n",
            WorkflowFormat::Yaml,
        );
        assert!(!report.valid);
        let tool_errors = report.of_type(ErrorType::Tool);
        assert_eq!(tool_errors.len(), 1);
        assert!(tool_errors[0].suggestion.as_deref().unwrap().contains("gemini"));
    }

    #[test]
    fn test_syntax_failure_short_circuits() {
        let report = validator().validate("name: t\n", WorkflowFormat::Yaml);
        assert!(!report.valid);
        assert!(report.workflow().is_none());
        assert!(report.errors.iter().all(|e| e.error_type == ErrorType::Syntax));
    }

    #[test]
    fn test_validation_is_idempotent() {
        let text = r#"
name: messy
variables:
  Topic: x
steps:
  - name: a
    tool: serch
    input: "${b.output} ${Topic} ${nope}"
  - name: b
    tool: llm
    dependsOn: [c]
  - name: c
    tool: llm
    dependsOn: [b]
"#;
        let v = validator();
        let first = v.validate(text, WorkflowFormat::Yaml);
        let second = v.validate(text, WorkflowFormat::Yaml);
        assert!(!first.errors.is_empty());
        assert_eq!(first.errors, second.errors);
        assert_eq!(first.warnings, second.warnings);
    }

    #[test]
    fn test_enabled_defaults_to_known() {
        let report = validator().validate(LINEAR, WorkflowFormat::Yaml);
        assert!(report.of_type(ErrorType::Tool).is_empty());
    }

    #[test]
    fn test_validate_file_uses_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("flow.json");
        std::fs::write(
            &path,
            r#"{"name": "j", "steps": [{"name": "only", "tool": "llm"}]}"#,
        )
        .unwrap();
        let report = validator().validate_file(&path).unwrap();
        assert!(report.valid);
    }
}
