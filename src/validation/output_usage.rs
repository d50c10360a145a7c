//! Output usage validation: flag work whose result nobody reads.

use std::collections::HashSet;

use super::{step_path, ErrorType, ValidationContext, ValidationError};
use crate::workflow::{SaveTarget, Workflow};

/// Names consumed anywhere in the workflow, split by mechanism.
struct Consumers<'a> {
    interpolated: HashSet<&'a str>,
    loaded: HashSet<&'a str>,
}

impl<'a> Consumers<'a> {
    fn collect(workflow: &'a Workflow) -> Self {
        let mut interpolated = HashSet::new();
        let mut loaded = HashSet::new();

        for step in &workflow.steps {
            for r in step.input_references().into_iter().chain(step.condition_references()) {
                interpolated.insert(r.head.as_str());
            }
            if let Some(input) = &step.input {
                interpolated.extend(input.step_refs());
            }
            loaded.extend(step.load_files.iter().map(String::as_str));
        }
        if let Some(SaveTarget::Path(t)) = workflow.output.as_ref().and_then(|o| o.save_to_file.as_ref()) {
            interpolated.extend(t.references().map(|r| r.head.as_str()));
        }

        Self { interpolated, loaded }
    }
}

/// Every step except the last and `parallel` steps must have its output
/// interpolated, loaded, or saved. A saved output nobody loads is a warning.
pub fn validate_output_usage(ctx: &ValidationContext) -> Vec<ValidationError> {
    let workflow = &ctx.workflow;
    let consumers = Consumers::collect(workflow);
    let mut findings = Vec::new();
    let last = workflow.steps.len().saturating_sub(1);

    for (i, step) in workflow.steps.iter().enumerate() {
        if i == last || step.parallel {
            continue;
        }

        let interpolated = consumers.interpolated.contains(step.name.as_str())
            || step
                .output_variable()
                .is_some_and(|v| consumers.interpolated.contains(v));
        let loaded = consumers.loaded.contains(step.name.as_str());

        if !interpolated && !loaded && !step.save_to_file {
            findings.push(
                ValidationError::error(
                    ErrorType::OutputUsage,
                    step_path(i, ""),
                    format!("Output of step '{}' is never used", step.name),
                )
                .with_suggestion(format!(
                    "Reference ${{{}.output}} in a later step, set saveToFile, or remove the step",
                    step.name
                )),
            );
        } else if step.save_to_file && !loaded {
            findings.push(
                ValidationError::warning(
                    ErrorType::OutputUsage,
                    step_path(i, "saveToFile"),
                    format!("Step '{}' saves its output but no step loads it", step.name),
                )
                .with_suggestion("Add the step to a later loadFiles list or drop saveToFile"),
            );
        }
    }

    findings
}
