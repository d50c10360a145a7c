//! Configuration management.
//!
//! stepwright configuration can come from:
//! - Environment variables (STEPWRIGHT_*)
//! - Config file (~/.config/stepwright/config.toml)

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};

/// stepwright configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Execution engine configuration
    #[serde(default)]
    pub engine: EngineConfig,

    /// Tool registry configuration
    #[serde(default)]
    pub tools: ToolsConfig,
}

/// Execution engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Directory under which one run directory per execution is created
    #[serde(default)]
    pub output_root: Option<PathBuf>,

    /// Character budget of in-memory step summaries
    #[serde(default = "default_summary_chars")]
    pub summary_chars: usize,

    /// Timeout for a single tool invocation attempt (seconds)
    #[serde(default = "default_invocation_timeout")]
    pub invocation_timeout_seconds: u64,

    /// Maximum number of cached step results
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: u64,

    #[serde(default = "default_cache_ttl")]
    pub cache_ttl_seconds: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            output_root: None,
            summary_chars: default_summary_chars(),
            invocation_timeout_seconds: default_invocation_timeout(),
            cache_capacity: default_cache_capacity(),
            cache_ttl_seconds: default_cache_ttl(),
        }
    }
}

impl EngineConfig {
    /// Configured output root, or `<data_dir>/runs`.
    pub fn output_root(&self) -> PathBuf {
        self.output_root
            .clone()
            .unwrap_or_else(|| Config::data_dir().join("runs"))
    }

    pub fn invocation_timeout(&self) -> Duration {
        Duration::from_secs(self.invocation_timeout_seconds)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_seconds)
    }
}

fn default_summary_chars() -> usize {
    500
}

fn default_invocation_timeout() -> u64 {
    300
}

fn default_cache_capacity() -> u64 {
    1000
}

fn default_cache_ttl() -> u64 {
    3600
}

/// Tool registry configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// All tool names a workflow may reference
    #[serde(default = "default_known_tools")]
    pub known: Vec<String>,

    /// Known tools that are switched off
    #[serde(default)]
    pub disabled: Vec<String>,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            known: default_known_tools(),
            disabled: Vec::new(),
        }
    }
}

fn default_known_tools() -> Vec<String> {
    ["echo", "llm", "search", "summarize", "synthesize"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

impl Config {
    /// Load configuration from default locations.
    pub fn load() -> Self {
        let mut config = Self::default();

        let primary_path = Self::config_dir().join("config.toml");
        if let Ok(partial) = Self::load_partial_from_path(&primary_path) {
            config.apply_partial(partial);
        }

        config.apply_env_overrides();
        config
    }

    /// Load from an explicit file; unlike [`Config::load`], a missing or
    /// malformed file is an error.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let mut config = Self::from_toml(&content)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Parse TOML text without consulting the environment.
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(format!("Invalid config: {}", e)))
    }

    /// Get the data directory.
    pub fn data_dir() -> PathBuf {
        dirs::data_dir()
            .map(|d| d.join("stepwright"))
            .unwrap_or_else(|| PathBuf::from(".stepwright"))
    }

    /// Get the config directory.
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .map(|d| d.join("stepwright"))
            .unwrap_or_else(|| PathBuf::from(".stepwright"))
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(root) = std::env::var("STEPWRIGHT_OUTPUT_ROOT") {
            self.engine.output_root = Some(PathBuf::from(root));
        }
        if let Ok(timeout) = std::env::var("STEPWRIGHT_INVOCATION_TIMEOUT") {
            if let Ok(parsed) = timeout.parse::<u64>() {
                self.engine.invocation_timeout_seconds = parsed;
            }
        }
        if let Ok(chars) = std::env::var("STEPWRIGHT_SUMMARY_CHARS") {
            if let Ok(parsed) = chars.parse::<usize>() {
                self.engine.summary_chars = parsed;
            }
        }
        if let Ok(tools) = std::env::var("STEPWRIGHT_TOOLS") {
            let known = parse_tool_list(&tools);
            if !known.is_empty() {
                self.tools.known = known;
            }
        }
    }

    fn load_partial_from_path(path: &Path) -> std::result::Result<PartialConfig, ()> {
        let content = std::fs::read_to_string(path).map_err(|_| ())?;
        toml::from_str(&content).map_err(|_| ())
    }

    fn apply_partial(&mut self, partial: PartialConfig) {
        if let Some(engine) = partial.engine {
            self.engine = engine;
        }
        if let Some(tools) = partial.tools {
            self.tools = tools;
        }
    }
}

fn parse_tool_list(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[derive(Debug, Default, Deserialize)]
struct PartialConfig {
    engine: Option<EngineConfig>,
    tools: Option<ToolsConfig>,
}
