//! Workflow definition, parsing, and dependency analysis.
//!
//! Workflows are defined in YAML or JSON and consist of:
//! - Steps: tool invocations, executed in declared order
//! - Variables: workflow-level scalars available to every step
//! - Settings: optimization, checkpoint and auto-synthesis policies

mod dag;
mod parser;
mod template;
mod types;

pub use dag::{reference_step, DependencyGraph, Edge, EdgeKind};
pub use parser::{
    parse_document, parse_workflow, parse_workflow_file, workflow_from_document, WorkflowFormat,
};
pub use template::{Reference, Segment, Template};
pub use types::*;
