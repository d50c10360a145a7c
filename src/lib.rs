//! stepwright - statically validated multi-step LLM tool workflows
//!
//! stepwright checks a workflow definition before anything runs, then
//! executes it step by step with retries, result caching, on-disk artifacts,
//! and checkpoints that let a crashed run resume.
//!
//! ## Key Features
//!
//! - **Validate First**: references, ordering, cycles, tools and unused
//!   outputs are reported as structured findings with paths and suggestions
//! - **Bounded Memory**: every step result is a short summary plus an
//!   optional artifact file loaded only on request
//! - **Resumable**: the manifest is rewritten after every step and
//!   checkpoints capture all bindings
//! - **Provider Failover**: a reusable router tries interchangeable backends
//!   in priority order
//!
//! ## Example
//!
//! ```yaml
//! name: research-brief
//! settings:
//!   optimization:
//!     enabled: true
//!     cacheResults: true
//! steps:
//!   - name: fetch
//!     tool: search
//!     input: "${query}"
//!     saveToFile: true
//!   - name: summarize
//!     tool: llm
//!     loadFiles: [fetch]
//!     input: "Summarize: ${fetch.output}"
//!     retry:
//!       attempts: 3
//!       backoff: 500
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod metrics;
pub mod shutdown;
pub mod telemetry;
pub mod tools;
pub mod validation;
pub mod workflow;

pub use engine::{ExecutionRecord, Executor, RunInput};
pub use error::{Error, Result};
pub use validation::{ValidatedWorkflow, ValidationReport, WorkflowValidator};
