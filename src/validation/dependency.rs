//! Dependency graph validation: cycles and forward `dependsOn`/`loadFiles`
//! edges.

use super::{step_path, ErrorType, ValidationContext, ValidationError};
use crate::workflow::{DependencyGraph, EdgeKind};

/// Report every cycle once, then every forward `dependsOn`/`loadFiles` edge
/// not already covered by a cycle.
///
/// Forward interpolation and condition references are reported by the
/// interpolation validator with the exact field path.
pub fn validate_dependencies(ctx: &ValidationContext) -> Vec<ValidationError> {
    let workflow = &ctx.workflow;
    let graph = DependencyGraph::build(workflow);
    let mut findings = Vec::new();

    let cycles = graph.find_cycles();
    for cycle in &cycles {
        let start = cycle.first().copied().unwrap_or(0);
        findings.push(
            ValidationError::error(
                ErrorType::Dependency,
                step_path(start, ""),
                format!("Circular dependency detected: {}", graph.render_path(cycle)),
            )
            .with_suggestion("Break the cycle by removing one of the references"),
        );
    }

    for edge in graph.forward_edges(&cycles) {
        let (field, entries) = match edge.kind {
            EdgeKind::DependsOn => ("dependsOn", &workflow.steps[edge.from].depends_on),
            EdgeKind::LoadFiles => ("loadFiles", &workflow.steps[edge.from].load_files),
            EdgeKind::Input | EdgeKind::Condition => continue,
        };
        let dependent = graph.name(edge.from);
        let dependency = graph.name(edge.to);
        let j = entries.iter().position(|e| e == dependency).unwrap_or(0);

        findings.push(
            ValidationError::error(
                ErrorType::Dependency,
                step_path(edge.from, &format!("{}/{}", field, j)),
                format!(
                    "Step '{}' depends on '{}' ({}) which is declared later",
                    dependent, dependency, field
                ),
            )
            .with_suggestion(format!("Move '{}' before '{}'", dependency, dependent)),
        );
    }

    findings
}
