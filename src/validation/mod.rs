//! Static workflow validation.
//!
//! Nothing here executes a step. Each validator inspects a parsed
//! [`Workflow`] and returns a list of [`ValidationError`]s; the aggregate
//! [`WorkflowValidator`] turns them into a pass/fail [`ValidationReport`].
//! Only a report with zero blocking errors yields a [`ValidatedWorkflow`],
//! which is the sole input the execution engine accepts.

mod dependency;
mod interpolation;
mod output_usage;
mod syntax;
mod tools;
mod validator;

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::tools::ToolRegistry;
use crate::workflow::Workflow;

pub use dependency::validate_dependencies;
pub use interpolation::{validate_interpolation, RUNTIME_VARIABLES};
pub use output_usage::validate_output_usage;
pub use syntax::{validate_syntax, SyntaxOutcome};
pub use tools::{levenshtein, suggest_tools, validate_tools};
pub use validator::WorkflowValidator;

/// Category of a validation finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorType {
    Syntax,
    Interpolation,
    Tool,
    Dependency,
    OutputUsage,
    Redundancy,
}

impl std::fmt::Display for ErrorType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorType::Syntax => write!(f, "syntax"),
            ErrorType::Interpolation => write!(f, "interpolation"),
            ErrorType::Tool => write!(f, "tool"),
            ErrorType::Dependency => write!(f, "dependency"),
            ErrorType::OutputUsage => write!(f, "output-usage"),
            ErrorType::Redundancy => write!(f, "redundancy"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Error => write!(f, "error"),
            Severity::Warning => write!(f, "warning"),
            Severity::Info => write!(f, "info"),
        }
    }
}

/// One validation finding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationError {
    #[serde(rename = "type")]
    pub error_type: ErrorType,
    pub severity: Severity,
    pub message: String,
    /// JSON-pointer-like locator, e.g. `/steps/2/input`
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

impl ValidationError {
    pub fn error(error_type: ErrorType, path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error_type,
            severity: Severity::Error,
            message: message.into(),
            path: path.into(),
            suggestion: None,
        }
    }

    pub fn warning(
        error_type: ErrorType,
        path: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            severity: Severity::Warning,
            ..Self::error(error_type, path, message)
        }
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    pub fn is_blocking(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{}/{}] {} ({})",
            self.error_type, self.severity, self.message, self.path
        )?;
        if let Some(s) = &self.suggestion {
            write!(f, " - {}", s)?;
        }
        Ok(())
    }
}

/// Line numbers of notable nodes in the source text, keyed by path.
///
/// Only step entries are tracked for now; the validators report paths and
/// callers may map them to lines through this table.
#[derive(Debug, Clone, Default)]
pub struct SourceMap {
    lines: BTreeMap<String, usize>,
}

impl SourceMap {
    /// Record the 1-based line of each step's `name` key, in order.
    pub fn scan(text: &str) -> Self {
        let mut lines = BTreeMap::new();
        let mut step = 0usize;
        let mut in_steps = false;
        for (i, line) in text.lines().enumerate() {
            let trimmed = line.trim_start();
            if trimmed.starts_with("steps:") || trimmed.starts_with("\"steps\"") {
                in_steps = true;
                continue;
            }
            let is_step_name = trimmed.starts_with("- name:")
                || trimmed.starts_with("{\"name\"")
                || (trimmed.starts_with("- ") && trimmed.contains("name:"));
            if in_steps && is_step_name {
                lines.insert(format!("/steps/{}", step), i + 1);
                step += 1;
            }
        }
        Self { lines }
    }

    pub fn line_of(&self, path: &str) -> Option<usize> {
        let step_prefix: String = path.split('/').take(3).collect::<Vec<_>>().join("/");
        self.lines
            .get(path)
            .or_else(|| self.lines.get(&step_prefix))
            .copied()
    }
}

/// Everything the validators need besides the workflow itself.
#[derive(Debug, Clone)]
pub struct ValidationContext {
    pub workflow: Workflow,
    pub known_tools: BTreeSet<String>,
    pub enabled_tools: BTreeSet<String>,
    pub source_map: SourceMap,
}

impl ValidationContext {
    pub fn new(workflow: Workflow, registry: &ToolRegistry) -> Self {
        Self {
            workflow,
            known_tools: registry.known().clone(),
            enabled_tools: registry.enabled(),
            source_map: SourceMap::default(),
        }
    }

    pub fn with_source_map(mut self, source_map: SourceMap) -> Self {
        self.source_map = source_map;
        self
    }
}

/// Aggregate outcome of validating one workflow text.
#[derive(Debug, Clone, Serialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<ValidationError>,
    #[serde(skip)]
    workflow: Option<Workflow>,
}

impl ValidationReport {
    pub(crate) fn from_findings(findings: Vec<ValidationError>, workflow: Option<Workflow>) -> Self {
        let (errors, warnings): (Vec<_>, Vec<_>) =
            findings.into_iter().partition(|f| f.is_blocking());
        Self {
            valid: errors.is_empty() && workflow.is_some(),
            errors,
            warnings,
            workflow,
        }
    }

    /// The parsed workflow, present whenever syntax validation passed.
    pub fn workflow(&self) -> Option<&Workflow> {
        self.workflow.as_ref()
    }

    /// All findings of one type.
    pub fn of_type(&self, error_type: ErrorType) -> Vec<&ValidationError> {
        self.errors
            .iter()
            .chain(self.warnings.iter())
            .filter(|f| f.error_type == error_type)
            .collect()
    }

    /// Hand the workflow to the engine if nothing blocks it.
    pub fn into_validated(self) -> Result<ValidatedWorkflow> {
        match self.workflow {
            Some(workflow) if self.errors.is_empty() => Ok(ValidatedWorkflow { workflow }),
            _ => {
                let summary = self
                    .errors
                    .iter()
                    .map(|e| e.to_string())
                    .collect::<Vec<_>>()
                    .join("; ");
                Err(Error::Validation(format!(
                    "{} blocking error(s): {}",
                    self.errors.len(),
                    summary
                )))
            }
        }
    }
}

/// A workflow that passed validation without blocking errors.
#[derive(Debug, Clone)]
pub struct ValidatedWorkflow {
    workflow: Workflow,
}

impl ValidatedWorkflow {
    pub fn workflow(&self) -> &Workflow {
        &self.workflow
    }
}

impl std::ops::Deref for ValidatedWorkflow {
    type Target = Workflow;

    fn deref(&self) -> &Workflow {
        &self.workflow
    }
}

/// Path of a step field, e.g. `/steps/3/input`.
pub(crate) fn step_path(index: usize, field: &str) -> String {
    if field.is_empty() {
        format!("/steps/{}", index)
    } else {
        format!("/steps/{}/{}", index, field)
    }
}
