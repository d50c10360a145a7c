//! Tool contracts.
//!
//! A tool is an external callable identified by name, typically a call to a
//! language-model provider. The engine only sees [`ToolCallable`]; concrete
//! provider clients live outside this crate.

mod echo;
mod model_router;
mod registry;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;

pub use echo::EchoTool;
pub use model_router::{ModelRouter, SizeTierRouter};
pub use registry::{ToolRegistry, ToolSet};

/// One invocation of a tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolRequest {
    pub tool: String,
    /// Step issuing the call
    pub step: String,
    /// Resolved input: a string for literal inputs, an object for structured ones
    pub input: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

impl ToolRequest {
    pub fn new(tool: &str, step: &str, input: Value) -> Self {
        Self {
            tool: tool.to_string(),
            step: step.to_string(),
            input,
            model: None,
            max_tokens: None,
            temperature: None,
        }
    }

    pub fn with_model(mut self, model: Option<String>) -> Self {
        self.model = model;
        self
    }

    /// Textual form of the input, used for routing and cache keys.
    pub fn input_text(&self) -> String {
        value_to_text(&self.input)
    }
}

/// Result of a successful tool call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolOutput {
    pub content: Value,
    /// Model that actually served the call, when the tool reports it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default)]
    pub cost: f64,
}

impl ToolOutput {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Value::String(content.into()),
            model: None,
            cost: 0.0,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_cost(mut self, cost: f64) -> Self {
        self.cost = cost;
        self
    }

    /// Content coerced to text; structured results are pretty-printed JSON.
    pub fn as_text(&self) -> String {
        value_to_text(&self.content)
    }
}

pub(crate) fn value_to_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string()),
    }
}

/// Trait every tool backend implements.
#[async_trait]
pub trait ToolCallable: Send + Sync {
    /// Invoke the tool once. Provider-side retries, if any, happen inside.
    async fn call(&self, request: &ToolRequest) -> Result<ToolOutput>;

    /// Name used in logs and failover reports.
    fn name(&self) -> &str {
        "tool"
    }
}
