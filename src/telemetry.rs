//! Logging initialisation.
//!
//! # Environment Variables
//!
//! - `RUST_LOG`: standard `EnvFilter` directives (default: `stepwright=info`)
//! - `STEPWRIGHT_LOG_JSON`: set to "true" for JSON log lines (default: false)

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Emit one JSON object per log line.
    pub json: bool,
    /// Filter used when `RUST_LOG` is unset.
    pub default_directive: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            json: std::env::var("STEPWRIGHT_LOG_JSON")
                .map(|v| v.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
            default_directive: "stepwright=info".to_string(),
        }
    }
}

impl LogConfig {
    fn filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&self.default_directive))
    }
}

/// Install the global `tracing` subscriber. Logs go to stderr so command
/// output on stdout stays machine-readable.
pub fn init_logging(
    config: &LogConfig,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    if config.json {
        tracing_subscriber::registry()
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_filter(config.filter()),
            )
            .try_init()?;
    } else {
        tracing_subscriber::registry()
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_writer(std::io::stderr)
                    .with_filter(config.filter()),
            )
            .try_init()?;
    }
    Ok(())
}
