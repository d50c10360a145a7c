//! Workflow YAML/JSON parser.

use std::path::Path;

use serde_json::Value;

use super::types::{resolve_step_refs, Workflow};
use crate::error::{Error, Result};

/// Source format of a workflow definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WorkflowFormat {
    #[default]
    Yaml,
    Json,
}

impl WorkflowFormat {
    /// Guess the format from a file extension (YAML unless `.json`).
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => WorkflowFormat::Json,
            _ => WorkflowFormat::Yaml,
        }
    }
}

impl std::str::FromStr for WorkflowFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "yaml" | "yml" => Ok(WorkflowFormat::Yaml),
            "json" => Ok(WorkflowFormat::Json),
            other => Err(format!("Unknown workflow format: {}", other)),
        }
    }
}

/// Parse raw text into a generic document without applying the schema.
pub fn parse_document(text: &str, format: WorkflowFormat) -> Result<Value> {
    if text.trim().is_empty() {
        return Err(Error::Parse("Empty workflow definition".to_string()));
    }

    match format {
        WorkflowFormat::Yaml => serde_yaml::from_str(text)
            .map_err(|e| Error::Parse(format!("Invalid YAML: {}", e))),
        WorkflowFormat::Json => serde_json::from_str(text)
            .map_err(|e| Error::Parse(format!("Invalid JSON: {}", e))),
    }
}

/// Apply the workflow schema to a parsed document.
pub fn workflow_from_document(document: Value) -> Result<Workflow> {
    let mut workflow: Workflow = serde_json::from_value(document).map_err(|e| {
        let msg = e.to_string();
        if let Some(field) = extract_missing_field(&msg) {
            Error::Parse(format!("Missing required field: {}", field))
        } else {
            Error::Parse(format!("Invalid workflow: {}", msg))
        }
    })?;
    resolve_step_refs(&mut workflow);
    Ok(workflow)
}

/// Parse a workflow from text.
pub fn parse_workflow(text: &str, format: WorkflowFormat) -> Result<Workflow> {
    workflow_from_document(parse_document(text, format)?)
}

/// Parse a workflow from a file path; the format follows the extension.
pub fn parse_workflow_file(path: &Path) -> Result<Workflow> {
    let content = std::fs::read_to_string(path)?;
    parse_workflow(&content, WorkflowFormat::from_path(path))
}

fn extract_missing_field(error_message: &str) -> Option<&str> {
    let marker = "missing field `";
    let start = error_message.find(marker)? + marker.len();
    let rest = &error_message[start..];
    let end = rest.find('`')?;
    Some(&rest[..end])
}
