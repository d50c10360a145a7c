//! Workflow type definitions.
//!
//! Field names follow the camelCase shape workflow authors (and the LLMs
//! that generate workflows) already use: `dependsOn`, `loadFiles`,
//! `saveToFile`, `failOnError`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::template::{Reference, Template};

/// A complete workflow definition.
///
/// # Example YAML
///
/// ```yaml
/// name: research-brief
/// variables:
///   audience: executives
/// steps:
///   - name: fetch
///     tool: search
///     input: "${query}"
///   - name: summarize
///     tool: llm
///     input: "Summarize for ${audience}: ${fetch.output}"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Workflow {
    /// Workflow name
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    /// Steps in declared (execution) order
    pub steps: Vec<Step>,

    /// Workflow-level variables
    #[serde(default)]
    pub variables: BTreeMap<String, VariableValue>,

    #[serde(default)]
    pub settings: WorkflowSettings,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<OutputSpec>,
}

/// Scalar workflow variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VariableValue {
    Bool(bool),
    Number(serde_json::Number),
    String(String),
}

impl VariableValue {
    /// Text form used for interpolation.
    pub fn as_text(&self) -> String {
        match self {
            VariableValue::Bool(b) => b.to_string(),
            VariableValue::Number(n) => n.to_string(),
            VariableValue::String(s) => s.clone(),
        }
    }
}

/// A step in the workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Step {
    /// Unique step name; also the dependency-graph node id
    pub name: String,

    /// Tool identifier, resolved against the tool registry
    pub tool: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<StepInput>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<StepOutput>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,

    /// Steps whose persisted artifacts are loaded before this step runs
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub load_files: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub when: Option<Template>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<StepCondition>,

    /// Run concurrently with adjacent independent parallel steps
    #[serde(default)]
    pub parallel: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry: Option<RetryConfig>,

    /// Persist the full output to disk
    #[serde(default)]
    pub save_to_file: bool,

    /// Explicit model override passed to the tool
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

impl Step {
    /// Create a bare step (used for synthesized steps and tests).
    pub fn new(name: &str, tool: &str) -> Self {
        Self {
            name: name.to_string(),
            tool: tool.to_string(),
            input: None,
            output: None,
            depends_on: Vec::new(),
            load_files: Vec::new(),
            when: None,
            condition: None,
            parallel: false,
            retry: None,
            save_to_file: false,
            model: None,
            max_tokens: None,
            temperature: None,
        }
    }

    /// Declared `output.variable`, if any.
    pub fn output_variable(&self) -> Option<&str> {
        self.output.as_ref().and_then(|o| o.variable.as_deref())
    }

    /// References appearing in the step input.
    pub fn input_references(&self) -> Vec<&Reference> {
        match &self.input {
            Some(input) => input.references(),
            None => Vec::new(),
        }
    }

    /// References appearing in `when` and `condition.if`.
    pub fn condition_references(&self) -> Vec<&Reference> {
        let mut refs: Vec<&Reference> = Vec::new();
        if let Some(when) = &self.when {
            refs.extend(when.references());
        }
        if let Some(cond) = &self.condition {
            if let Some(expr) = &cond.if_expr {
                refs.extend(expr.references());
            }
        }
        refs
    }

    pub fn fail_on_error(&self) -> bool {
        self.condition.as_ref().is_some_and(|c| c.fail_on_error)
    }

    pub fn retry_attempts(&self) -> u32 {
        self.retry.as_ref().map(|r| r.attempts.max(1)).unwrap_or(1)
    }
}

/// Step input: a literal template or a map of values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StepInput {
    Literal(Template),
    Structured(BTreeMap<String, InputValue>),
}

impl StepInput {
    pub fn references(&self) -> Vec<&Reference> {
        match self {
            StepInput::Literal(t) => t.references().collect(),
            StepInput::Structured(map) => map
                .values()
                .filter_map(|v| match v {
                    InputValue::Text(t) => Some(t.references()),
                    _ => None,
                })
                .flatten()
                .collect(),
        }
    }

    /// Step names named by `previousStep` fields.
    pub fn step_refs(&self) -> Vec<&str> {
        match self {
            StepInput::Literal(_) => Vec::new(),
            StepInput::Structured(map) => map
                .values()
                .filter_map(|v| match v {
                    InputValue::StepRef(name) => Some(name.as_str()),
                    _ => None,
                })
                .collect(),
        }
    }
}

/// Key whose string value names another step rather than a template.
pub const PREVIOUS_STEP_KEY: &str = "previousStep";

/// A value inside a structured step input.
#[derive(Debug, Clone, PartialEq)]
pub enum InputValue {
    Text(Template),
    Number(serde_json::Number),
    Bool(bool),
    /// Replaced at runtime by the named step's summary
    StepRef(String),
}

impl Serialize for InputValue {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            InputValue::Text(t) => serializer.serialize_str(t.as_str()),
            InputValue::StepRef(name) => serializer.serialize_str(name),
            InputValue::Number(n) => n.serialize(serializer),
            InputValue::Bool(b) => serializer.serialize_bool(*b),
        }
    }
}

impl<'de> Deserialize<'de> for InputValue {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match VariableValue::deserialize(deserializer)? {
            VariableValue::String(s) => Ok(InputValue::Text(Template::parse(&s))),
            VariableValue::Number(n) => Ok(InputValue::Number(n)),
            VariableValue::Bool(b) => Ok(InputValue::Bool(b)),
        }
    }
}

/// Converts `previousStep` text values into step references.
///
/// Serde cannot see the map key while deserializing a value, so the parser
/// calls this once after loading.
pub(crate) fn resolve_step_refs(workflow: &mut Workflow) {
    for step in &mut workflow.steps {
        if let Some(StepInput::Structured(map)) = &mut step.input {
            let target = match map.get(PREVIOUS_STEP_KEY) {
                Some(InputValue::Text(t)) => t.as_str().trim().to_string(),
                _ => continue,
            };
            map.insert(PREVIOUS_STEP_KEY.to_string(), InputValue::StepRef(target));
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepOutput {
    /// Name under which the result is visible to later steps
    #[serde(default)]
    pub variable: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepCondition {
    #[serde(default, rename = "if")]
    pub if_expr: Option<Template>,

    /// Skip the step when `if` is false
    #[serde(default)]
    pub skip: bool,

    /// Abort the run when retries are exhausted
    #[serde(default)]
    pub fail_on_error: bool,
}

/// Retry configuration for a step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_attempts")]
    pub attempts: u32,

    /// Base delay in milliseconds; attempt `n` waits `backoff * n`
    #[serde(default)]
    pub backoff: u64,
}

fn default_attempts() -> u32 {
    1
}

/// Global workflow settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowSettings {
    #[serde(default)]
    pub optimization: OptimizationSettings,

    #[serde(default)]
    pub checkpoint: CheckpointSettings,

    #[serde(default)]
    pub auto_synthesis: AutoSynthesisSettings,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptimizationSettings {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub cache_results: bool,
    #[serde(default)]
    pub compress_prompts: bool,
    #[serde(default)]
    pub smart_routing: bool,
}

impl OptimizationSettings {
    pub fn caching(&self) -> bool {
        self.enabled && self.cache_results
    }

    pub fn compression(&self) -> bool {
        self.enabled && self.compress_prompts
    }

    pub fn routing(&self) -> bool {
        self.enabled && self.smart_routing
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckpointSettings {
    #[serde(default)]
    pub enabled: bool,

    /// Estimated output tokens between checkpoints
    #[serde(default = "default_token_interval")]
    pub token_interval: u64,
}

impl Default for CheckpointSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            token_interval: default_token_interval(),
        }
    }
}

fn default_token_interval() -> u64 {
    10_000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutoSynthesisSettings {
    #[serde(default)]
    pub enabled: bool,

    /// Accumulated output tokens above which a synthesis step runs
    #[serde(default = "default_synthesis_threshold")]
    pub token_threshold: u64,

    #[serde(default = "default_synthesis_tool")]
    pub tool: String,

    #[serde(default = "default_synthesis_attempts")]
    pub attempts: u32,

    #[serde(default = "default_synthesis_backoff")]
    pub backoff: u64,
}

impl Default for AutoSynthesisSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            token_threshold: default_synthesis_threshold(),
            tool: default_synthesis_tool(),
            attempts: default_synthesis_attempts(),
            backoff: default_synthesis_backoff(),
        }
    }
}

fn default_synthesis_threshold() -> u64 {
    20_000
}

fn default_synthesis_tool() -> String {
    "synthesize".to_string()
}

fn default_synthesis_attempts() -> u32 {
    2
}

fn default_synthesis_backoff() -> u64 {
    1_000
}

/// Workflow-level output policy.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputSpec {
    #[serde(default)]
    pub format: OutputFormat,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub save_to_file: Option<SaveTarget>,

    /// Truncate per-step summaries in the final report
    #[serde(default)]
    pub truncate_steps: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Markdown,
    Json,
    Text,
}

/// `output.saveToFile`: a flag or a path template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SaveTarget {
    Enabled(bool),
    Path(Template),
}

impl Workflow {
    /// Get a step by name.
    pub fn get_step(&self, name: &str) -> Option<&Step> {
        self.steps.iter().find(|s| s.name == name)
    }

    /// Position of a step in declared order.
    pub fn step_index(&self, name: &str) -> Option<usize> {
        self.steps.iter().position(|s| s.name == name)
    }

    /// Index of the step declaring `output.variable == variable`.
    pub fn output_variable_owner(&self, variable: &str) -> Option<usize> {
        self.steps
            .iter()
            .position(|s| s.output_variable() == Some(variable))
    }
}
