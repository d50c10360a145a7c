//! Tool registry (names) and tool set (implementations).

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use async_trait::async_trait;

use super::{ToolCallable, ToolOutput, ToolRequest};
use crate::config::ToolsConfig;
use crate::error::{Error, Result};

/// The known and enabled tool names, as seen by validation.
#[derive(Debug, Clone, Default)]
pub struct ToolRegistry {
    known: BTreeSet<String>,
    /// `None` means every known tool is enabled
    enabled: Option<BTreeSet<String>>,
}

impl ToolRegistry {
    pub fn new<I, S>(known: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            known: known.into_iter().map(Into::into).collect(),
            enabled: None,
        }
    }

    pub fn from_config(config: &ToolsConfig) -> Self {
        Self::new(config.known.iter().cloned()).with_disabled(config.disabled.iter().cloned())
    }

    /// Replace the enabled set.
    pub fn with_enabled<I, S>(mut self, enabled: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.enabled = Some(enabled.into_iter().map(Into::into).collect());
        self
    }

    /// Enable every known tool except `disabled`.
    pub fn with_disabled<I, S>(self, disabled: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let disabled: BTreeSet<String> = disabled.into_iter().map(Into::into).collect();
        if disabled.is_empty() {
            return self;
        }
        let enabled: Vec<String> = self.known.difference(&disabled).cloned().collect();
        self.with_enabled(enabled)
    }

    pub fn known(&self) -> &BTreeSet<String> {
        &self.known
    }

    pub fn enabled(&self) -> BTreeSet<String> {
        self.enabled.clone().unwrap_or_else(|| self.known.clone())
    }

    pub fn is_known(&self, tool: &str) -> bool {
        self.known.contains(tool)
    }

    pub fn is_enabled(&self, tool: &str) -> bool {
        match &self.enabled {
            Some(enabled) => enabled.contains(tool),
            None => self.known.contains(tool),
        }
    }
}

/// Dispatches calls to tool implementations by `request.tool`.
#[derive(Clone, Default)]
pub struct ToolSet {
    tools: HashMap<String, Arc<dyn ToolCallable>>,
    fallback: Option<Arc<dyn ToolCallable>>,
}

impl ToolSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an implementation under a tool name.
    pub fn register(mut self, name: &str, tool: Arc<dyn ToolCallable>) -> Self {
        self.tools.insert(name.to_string(), tool);
        self
    }

    /// Implementation used for names without a registration.
    pub fn with_fallback(mut self, tool: Arc<dyn ToolCallable>) -> Self {
        self.fallback = Some(tool);
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ToolCallable>> {
        self.tools.get(name).or(self.fallback.as_ref()).cloned()
    }
}

#[async_trait]
impl ToolCallable for ToolSet {
    async fn call(&self, request: &ToolRequest) -> Result<ToolOutput> {
        let tool = self
            .get(&request.tool)
            .ok_or_else(|| Error::Tool(format!("Unknown tool: {}", request.tool)))?;
        tool.call(request).await
    }

    fn name(&self) -> &str {
        "toolset"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::EchoTool;
    use serde_json::json;

    #[test]
    fn test_enabled_defaults_to_known() {
        let registry = ToolRegistry::new(["llm", "search"]);
        assert_eq!(registry.enabled(), *registry.known());
        assert!(registry.is_enabled("llm"));
        assert!(!registry.is_known("gemini"));
    }

    #[test]
    fn test_from_config_subtracts_disabled() {
        let config = ToolsConfig {
            known: vec!["llm".into(), "search".into()],
            disabled: vec!["search".into()],
        };
        let registry = ToolRegistry::from_config(&config);
        assert!(registry.is_known("search"));
        assert!(!registry.is_enabled("search"));
        assert!(registry.is_enabled("llm"));
    }

    #[tokio::test]
    async fn test_tool_set_dispatch() {
        let set = ToolSet::new().register("echo", Arc::new(EchoTool::new()));
        let ok = set
            .call(&ToolRequest::new("echo", "s", json!("hi")))
            .await
            .unwrap();
        assert_eq!(ok.as_text(), "hi");

        let err = set
            .call(&ToolRequest::new("llm", "s", json!("hi")))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "TOOL_ERROR");

        let with_fallback = set.with_fallback(Arc::new(EchoTool::new()));
        assert!(with_fallback
            .call(&ToolRequest::new("llm", "s", json!("hi")))
            .await
            .is_ok());
    }
}
