//! Echo tool: returns its input. Used by the CLI and in tests.

use async_trait::async_trait;

use super::{ToolCallable, ToolOutput, ToolRequest};
use crate::error::Result;

#[derive(Debug, Clone, Default)]
pub struct EchoTool;

impl EchoTool {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ToolCallable for EchoTool {
    async fn call(&self, request: &ToolRequest) -> Result<ToolOutput> {
        let output = ToolOutput {
            content: request.input.clone(),
            model: None,
            cost: 0.0,
        };
        Ok(output.with_model(request.model.clone().unwrap_or_else(|| "echo".to_string())))
    }

    fn name(&self) -> &str {
        "echo"
    }
}
