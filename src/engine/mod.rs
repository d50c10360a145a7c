//! Execution engine for workflows.
//!
//! The [`Executor`] runs a [`crate::validation::ValidatedWorkflow`] step by
//! step. Each step result becomes a [`FileReference`] (bounded summary plus
//! optional artifact on disk); progress is mirrored to a manifest after
//! every step and periodically checkpointed for resume.

mod cache;
mod checkpoint;
mod circuit_breaker;
mod executor;
mod file_ref;
mod fs_atomic;
mod manifest;
mod router;
mod state;

pub use cache::{normalize, CachedResult, ResultCache};
pub use checkpoint::{Checkpoint, CheckpointPolicy, CHECKPOINT_FILE};
pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use executor::{Executor, RunInput, SYNTHESIS_STEP};
pub use file_ref::{estimate_tokens, summarize, FileReference};
pub use fs_atomic::{atomic_write, atomic_write_json};
pub use manifest::{
    ExecutionRecord, RunStatus, StepRecord, StepSummary, WorkflowManifest, MANIFEST_FILE,
};
pub use router::{CallPolicy, ProviderRouter, Routed};
pub use state::{Binding, Bindings};
