//! Execution metrics.
//!
//! Recorded through the `metrics` facade; the library installs no exporter,
//! so these calls are no-ops until the embedding application installs a
//! recorder.
//!
//! ## Metrics
//!
//! ### Counters
//! - `stepwright_steps_executed_total` - Step outcomes by status (completed, skipped, cached, failed)
//! - `stepwright_tool_attempts_total` - Tool invocation attempts by tool and outcome
//! - `stepwright_cache_lookups_total` - Result cache lookups by outcome (hit, miss)
//! - `stepwright_provider_failovers_total` - Provider router failovers by failed provider
//!
//! ### Histograms
//! - `stepwright_step_duration_seconds` - Step duration by tool
//!
//! ### Gauges
//! - `stepwright_active_runs` - Currently running workflow runs

use metrics::{counter, gauge, histogram};
use std::time::Duration;

/// Record a finished step.
pub fn record_step(status: &str) {
    counter!(
        "stepwright_steps_executed_total",
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record one tool invocation attempt.
pub fn record_tool_attempt(tool: &str, outcome: &str) {
    counter!(
        "stepwright_tool_attempts_total",
        "tool" => tool.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

pub fn record_cache_lookup(hit: bool) {
    counter!(
        "stepwright_cache_lookups_total",
        "outcome" => if hit { "hit" } else { "miss" }
    )
    .increment(1);
}

/// Record that the router moved past a failed provider.
pub fn record_provider_failover(provider: &str) {
    counter!(
        "stepwright_provider_failovers_total",
        "provider" => provider.to_string()
    )
    .increment(1);
}

pub fn record_step_duration(duration: Duration, tool: &str) {
    histogram!(
        "stepwright_step_duration_seconds",
        "tool" => tool.to_string()
    )
    .record(duration.as_secs_f64());
}

pub fn inc_active_runs() {
    gauge!("stepwright_active_runs").increment(1.0);
}

pub fn dec_active_runs() {
    gauge!("stepwright_active_runs").decrement(1.0);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_without_recorder_is_noop() {
        record_step("completed");
        record_tool_attempt("llm", "success");
        record_cache_lookup(true);
        record_provider_failover("primary");
        record_step_duration(Duration::from_millis(5), "llm");
        inc_active_runs();
        dec_active_runs();
    }
}
