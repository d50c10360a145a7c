//! Workflow executor.
//!
//! Runs the steps of a validated workflow in declared order, committing each
//! result (or skip) to the run's bindings before the next step starts.
//! Consecutive `parallel` steps with no dependency between them are invoked
//! concurrently and committed in declared order.

use std::collections::BTreeMap;
use std::ops::Range;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use serde_json::{json, Value};
use tokio::task::JoinSet;
use tokio::time::{sleep, timeout};
use tracing::{debug, error, info, instrument, warn, Instrument, Span};
use uuid::Uuid;

use super::cache::{normalize, CachedResult, ResultCache};
use super::checkpoint::{Checkpoint, CheckpointPolicy};
use super::file_ref::{estimate_tokens, FileReference};
use super::fs_atomic::atomic_write;
use super::manifest::{ExecutionRecord, RunStatus, StepRecord, StepSummary, WorkflowManifest};
use super::state::Bindings;
use crate::config::EngineConfig;
use crate::error::{Error, ErrorResponse, Result};
use crate::metrics;
use crate::shutdown::CancelSignal;
use crate::tools::{ModelRouter, SizeTierRouter, ToolCallable, ToolOutput, ToolRequest};
use crate::validation::ValidatedWorkflow;
use crate::workflow::{DependencyGraph, OutputFormat, OutputSpec, SaveTarget, Step, Workflow};

/// Name of the step appended by auto-synthesis.
pub const SYNTHESIS_STEP: &str = "synthesis";

/// Caller-supplied inputs of one run.
#[derive(Debug, Clone, Default)]
pub struct RunInput {
    /// Bound as `query` and `input`
    pub query: String,
    /// Extra variables; override workflow variables of the same name
    pub variables: BTreeMap<String, String>,
}

impl RunInput {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            variables: BTreeMap::new(),
        }
    }

    pub fn with_variable(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.variables.insert(name.into(), value.into());
        self
    }
}

/// Workflow executor.
#[derive(Clone)]
pub struct Executor {
    tool: Arc<dyn ToolCallable>,
    model_router: Arc<dyn ModelRouter>,
    cache: ResultCache,
    config: EngineConfig,
    invocation_timeout: Duration,
    cancel: CancelSignal,
}

impl Executor {
    /// Create an executor dispatching every step to `tool`.
    pub fn new(tool: Arc<dyn ToolCallable>) -> Self {
        let config = EngineConfig::default();
        Self {
            tool,
            model_router: Arc::new(SizeTierRouter::default()),
            cache: ResultCache::from_config(&config),
            invocation_timeout: config.invocation_timeout(),
            config,
            cancel: CancelSignal::new(),
        }
    }

    /// Model router used for steps of workflows with smart routing on.
    pub fn with_model_router(mut self, router: Arc<dyn ModelRouter>) -> Self {
        self.model_router = router;
        self
    }

    /// Share a result cache, e.g. across executors.
    pub fn with_cache(mut self, cache: ResultCache) -> Self {
        self.cache = cache;
        self
    }

    /// Apply engine configuration. Resets the invocation timeout to the
    /// configured one.
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.invocation_timeout = config.invocation_timeout();
        self.config = config;
        self
    }

    /// Bound on a single tool invocation attempt.
    pub fn with_invocation_timeout(mut self, invocation_timeout: Duration) -> Self {
        self.invocation_timeout = invocation_timeout;
        self
    }

    pub fn with_cancel(mut self, cancel: CancelSignal) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cache(&self) -> &ResultCache {
        &self.cache
    }

    /// Execute a workflow in a fresh run directory under the output root.
    ///
    /// Step failures do not surface as `Err`: the returned record has
    /// status `failed` and the error preserved. `Err` means the run's own
    /// files could not be written.
    #[instrument(
        name = "workflow.execute",
        skip(self, workflow, input),
        fields(
            workflow_name = %workflow.name,
            workflow_id = tracing::field::Empty,
        )
    )]
    pub async fn execute(
        &self,
        workflow: &ValidatedWorkflow,
        input: RunInput,
    ) -> Result<ExecutionRecord> {
        let workflow = workflow.workflow();
        let workflow_id = new_workflow_id();
        Span::current().record("workflow_id", workflow_id.as_str());

        let output_dir = self.config.output_root().join(&workflow_id);
        std::fs::create_dir_all(&output_dir)?;

        let manifest = WorkflowManifest::new(&workflow_id, &workflow.name, &input.query);
        let mut bindings = Bindings::new();
        for (name, value) in &workflow.variables {
            bindings.set_text(name, value.as_text());
        }
        for (name, value) in &input.variables {
            bindings.set_text(name, value.clone());
        }
        bindings.set_text("input", input.query.clone());
        bindings.set_text("query", input.query.clone());
        bindings.set_text("timestamp", manifest.start_time.to_rfc3339());
        manifest.write(&output_dir)?;

        info!(
            steps = workflow.steps.len(),
            output_dir = %output_dir.display(),
            "Starting workflow run"
        );

        let run = Run::new(workflow, output_dir, manifest, bindings, &self.config);
        self.drive(run, 0).await
    }

    /// Continue a run from the checkpoint in `output_dir`.
    #[instrument(
        name = "workflow.resume",
        skip(self, workflow, output_dir),
        fields(workflow_name = %workflow.name, output_dir = %output_dir.display())
    )]
    pub async fn resume(
        &self,
        workflow: &ValidatedWorkflow,
        output_dir: &Path,
    ) -> Result<ExecutionRecord> {
        let workflow = workflow.workflow();
        let checkpoint = Checkpoint::load(output_dir)?.ok_or_else(|| {
            Error::Execution(format!("No checkpoint in {}", output_dir.display()))
        })?;
        let mut manifest = WorkflowManifest::load(output_dir)?;
        if manifest.workflow_id != checkpoint.workflow_id {
            return Err(Error::Execution(format!(
                "Checkpoint belongs to run '{}', manifest to '{}'",
                checkpoint.workflow_id, manifest.workflow_id
            )));
        }
        if manifest.workflow_name != workflow.name {
            return Err(Error::Execution(format!(
                "Run directory holds workflow '{}', not '{}'",
                manifest.workflow_name, workflow.name
            )));
        }

        manifest.steps.truncate(checkpoint.step_index);
        manifest.status = RunStatus::Running;
        manifest.end_time = None;
        manifest.error = None;
        manifest.tokens = checkpoint.tokens;
        manifest.total_cost = checkpoint.total_cost;
        manifest.write(output_dir)?;

        info!(
            workflow_id = %manifest.workflow_id,
            step_index = checkpoint.step_index,
            "Resuming workflow run"
        );

        let mut run = Run::new(
            workflow,
            output_dir.to_path_buf(),
            manifest,
            checkpoint.bindings,
            &self.config,
        );
        run.restore_summaries();
        self.drive(run, checkpoint.step_index).await
    }

    async fn drive(&self, mut run: Run<'_>, start: usize) -> Result<ExecutionRecord> {
        metrics::inc_active_runs();
        let result = self.drive_steps(&mut run, start).await;
        metrics::dec_active_runs();
        result?;
        Ok(run.into_record())
    }

    async fn drive_steps(&self, run: &mut Run<'_>, start: usize) -> Result<()> {
        let mut failure = self.run_steps(run, start).await?;
        if failure.is_none() {
            failure = self.synthesize(run).await?;
        }
        if failure.is_none() {
            if let Err(e) = run.write_report() {
                failure = Some(StepFailure::new(run.workflow.steps.len(), "output", &e));
            }
        }

        match failure {
            None => {
                run.manifest.finish(RunStatus::Completed, None);
                run.manifest.write(&run.output_dir)?;
                Checkpoint::remove(&run.output_dir)?;
                info!(
                    steps = run.manifest.steps.len(),
                    tokens = run.manifest.tokens,
                    "Workflow run completed"
                );
            }
            Some(failure) => {
                if run.checkpoints.is_some() {
                    run.checkpoint(failure.resume_at)?;
                }
                error!(
                    step = ?failure.response.step,
                    code = %failure.response.code,
                    "Workflow run failed: {}",
                    failure.response.message
                );
                run.manifest.finish(RunStatus::Failed, Some(failure.response));
                run.manifest.write(&run.output_dir)?;
            }
        }
        Ok(())
    }

    async fn run_steps(&self, run: &mut Run<'_>, start: usize) -> Result<Option<StepFailure>> {
        let workflow = run.workflow;
        let steps = &workflow.steps;
        let mut index = start;
        while index < steps.len() {
            if self.cancel.is_cancelled() {
                return Ok(Some(StepFailure::new(
                    index,
                    &steps[index].name,
                    &Error::Cancelled,
                )));
            }
            let end = group_end(workflow, &run.graph, index);
            if let Some(failure) = self.run_group(run, index..end).await? {
                return Ok(Some(failure));
            }
            index = end;
        }
        Ok(None)
    }

    /// Prepare, invoke, and commit the steps in `range`.
    async fn run_group(
        &self,
        run: &mut Run<'_>,
        range: Range<usize>,
    ) -> Result<Option<StepFailure>> {
        let workflow = run.workflow;

        let mut prepared = Vec::with_capacity(range.len());
        for index in range.clone() {
            match self.prepare(run, index) {
                Ok(p) => prepared.push(p),
                Err(e) => {
                    return Ok(Some(StepFailure::new(
                        range.start,
                        &workflow.steps[index].name,
                        &e,
                    )))
                }
            }
        }

        let mut results: Vec<Option<Invoked>> = prepared.iter().map(|_| None).collect();
        let ready = prepared
            .iter()
            .filter(|p| matches!(p, Prepared::Ready(_)))
            .count();
        if ready > 1 {
            debug!(
                first = %workflow.steps[range.start].name,
                size = ready,
                "Invoking parallel steps concurrently"
            );
            let mut join_set = JoinSet::new();
            for (slot, p) in prepared.iter().enumerate() {
                if let Prepared::Ready(invocation) = p {
                    let this = self.clone();
                    let invocation = invocation.clone();
                    join_set.spawn(
                        async move { (slot, this.invoke(&invocation).await) }
                            .instrument(Span::current()),
                    );
                }
            }
            while let Some(joined) = join_set.join_next().await {
                let (slot, invoked) = joined
                    .map_err(|e| Error::Execution(format!("Step task failed: {}", e)))?;
                results[slot] = Some(invoked);
            }
        } else {
            for (slot, p) in prepared.iter().enumerate() {
                if let Prepared::Ready(invocation) = p {
                    results[slot] = Some(self.invoke(invocation).await);
                }
            }
        }

        for (slot, p) in prepared.into_iter().enumerate() {
            let step = &workflow.steps[range.start + slot];
            match (p, results[slot].take()) {
                (Prepared::Ready(invocation), Some(invoked)) => {
                    if let Some(failure) = run.settle(step, &invocation, invoked)? {
                        return Ok(Some(failure));
                    }
                }
                _ => run.commit_skipped(step)?,
            }
        }
        Ok(None)
    }

    /// Evaluate conditions, load files, and build the tool request.
    fn prepare(&self, run: &mut Run<'_>, index: usize) -> Result<Prepared> {
        let workflow = run.workflow;
        let step = &workflow.steps[index];

        if !should_run(&run.bindings, step)? {
            debug!(step = %step.name, "Condition false, skipping step");
            return Ok(Prepared::Skipped);
        }

        for name in &step.load_files {
            run.load_file(name)?;
        }

        let optimization = &workflow.settings.optimization;
        let mut input = run.bindings.resolve_input(step.input.as_ref());
        if optimization.compression() {
            input = compress(input);
        }

        let mut request = ToolRequest::new(&step.tool, &step.name, input);
        request.max_tokens = step.max_tokens;
        request.temperature = step.temperature;
        let model = match &step.model {
            Some(model) => Some(model.clone()),
            None if optimization.routing() => {
                Some(self.model_router.choose_model(&request.input_text()))
            }
            None => None,
        };
        request = request.with_model(model);

        let cache_key = optimization.caching().then(|| {
            let target = request.model.as_deref().unwrap_or(&step.tool);
            ResultCache::key(target, &request.input_text())
        });

        Ok(Prepared::Ready(Invocation {
            index,
            request,
            cache_key,
            attempts: step.retry_attempts(),
            backoff: Duration::from_millis(step.retry.as_ref().map(|r| r.backoff).unwrap_or(0)),
            fail_on_error: step.fail_on_error(),
            save_path: step.save_to_file.then(|| run.artifact_path(&step.name)),
        }))
    }

    /// Cache lookup, then the tool call with retries.
    async fn invoke(&self, invocation: &Invocation) -> Invoked {
        let started = Instant::now();

        if let Some(key) = &invocation.cache_key {
            let hit = self.cache.get(key).await;
            metrics::record_cache_lookup(hit.is_some());
            if let Some(hit) = hit {
                debug!(step = %invocation.request.step, "Result cache hit");
                return Invoked {
                    outcome: Outcome::Produced {
                        text: hit.content.to_string(),
                        model: hit.model,
                        cost: 0.0,
                        cached: true,
                    },
                    duration: started.elapsed(),
                };
            }
        }

        let outcome = match self.call_with_retry(invocation).await {
            Ok(output) => {
                let text = output.as_text();
                let model = output.model.or_else(|| invocation.request.model.clone());
                if let Some(key) = &invocation.cache_key {
                    self.cache
                        .insert(
                            key.clone(),
                            CachedResult {
                                content: Arc::from(text.as_str()),
                                model: model.clone(),
                            },
                        )
                        .await;
                }
                Outcome::Produced {
                    text,
                    model,
                    cost: output.cost,
                    cached: false,
                }
            }
            Err(Error::Cancelled) => Outcome::Fatal(Error::Cancelled),
            Err(e) if invocation.fail_on_error => Outcome::Fatal(e),
            Err(e) => {
                warn!(
                    step = %invocation.request.step,
                    error = %e,
                    "Step failed after retries, continuing with empty result"
                );
                Outcome::Absorbed(e.to_string())
            }
        };
        Invoked {
            outcome,
            duration: started.elapsed(),
        }
    }

    #[instrument(
        name = "step.invoke",
        skip(self, invocation),
        fields(
            step = %invocation.request.step,
            tool = %invocation.request.tool,
            attempts = invocation.attempts,
        )
    )]
    async fn call_with_retry(&self, invocation: &Invocation) -> Result<ToolOutput> {
        let request = &invocation.request;
        let mut attempt = 1u32;
        loop {
            let call = timeout(self.invocation_timeout, self.tool.call(request));
            let outcome = tokio::select! {
                _ = self.cancel.cancelled() => return Err(Error::Cancelled),
                result = call => match result {
                    Ok(result) => result,
                    Err(_) => Err(Error::Timeout(format!(
                        "Step '{}' did not finish within {:?}",
                        request.step, self.invocation_timeout
                    ))),
                },
            };

            match outcome {
                Ok(output) => {
                    metrics::record_tool_attempt(&request.tool, "success");
                    return Ok(output);
                }
                Err(e) => {
                    let label = if matches!(e, Error::Timeout(_)) {
                        "timeout"
                    } else {
                        "failed"
                    };
                    metrics::record_tool_attempt(&request.tool, label);
                    if attempt >= invocation.attempts || !e.is_retryable() {
                        return Err(e);
                    }

                    let delay = invocation.backoff.saturating_mul(attempt);
                    warn!(
                        "Step '{}' attempt {}/{} failed: {}. Retrying in {}ms",
                        request.step,
                        attempt,
                        invocation.attempts,
                        e,
                        delay.as_millis()
                    );
                    tokio::select! {
                        _ = self.cancel.cancelled() => return Err(Error::Cancelled),
                        _ = sleep(delay) => {}
                    }
                    attempt = attempt.saturating_add(1);
                }
            }
        }
    }

    /// Run the synthesis step when output volume crossed the threshold.
    async fn synthesize(&self, run: &mut Run<'_>) -> Result<Option<StepFailure>> {
        let workflow = run.workflow;
        let settings = &workflow.settings.auto_synthesis;
        if !settings.enabled
            || run.summaries.is_empty()
            || run.manifest.tokens <= settings.token_threshold
        {
            return Ok(None);
        }
        if self.cancel.is_cancelled() {
            return Ok(Some(StepFailure::new(
                workflow.steps.len(),
                SYNTHESIS_STEP,
                &Error::Cancelled,
            )));
        }

        info!(
            tokens = run.manifest.tokens,
            threshold = settings.token_threshold,
            tool = %settings.tool,
            "Output volume over threshold, running synthesis"
        );

        let step = Step::new(SYNTHESIS_STEP, &settings.tool);
        let input = synthesis_input(&run.manifest.query, &run.summaries);
        let invocation = Invocation {
            index: workflow.steps.len(),
            request: ToolRequest::new(&step.tool, &step.name, Value::String(input)),
            cache_key: None,
            attempts: settings.attempts.max(1),
            backoff: Duration::from_millis(settings.backoff),
            fail_on_error: false,
            save_path: Some(run.artifact_path(SYNTHESIS_STEP)),
        };
        let invoked = self.invoke(&invocation).await;
        run.settle(&step, &invocation, invoked)
    }
}

/// `YYYYMMDDTHHMMSSmmmZ-xxxxxxxx`: sortable by start time.
fn new_workflow_id() -> String {
    let random = Uuid::new_v4().simple().to_string();
    format!(
        "{}-{}",
        Utc::now().format("%Y%m%dT%H%M%S%3fZ"),
        &random[..8]
    )
}

/// End (exclusive) of the step group starting at `start`: a single step,
/// or the longest run of consecutive `parallel` steps none of which
/// depends on another.
fn group_end(workflow: &Workflow, graph: &DependencyGraph, start: usize) -> usize {
    let steps = &workflow.steps;
    if !steps[start].parallel {
        return start + 1;
    }
    let mut end = start + 1;
    while end < steps.len()
        && steps[end].parallel
        && (start..end).all(|member| !graph.connected(member, end))
    {
        end += 1;
    }
    end
}

fn should_run(bindings: &Bindings, step: &Step) -> Result<bool> {
    if let Some(when) = &step.when {
        if !bindings.evaluate_condition(when)? {
            return Ok(false);
        }
    }
    if let Some(condition) = &step.condition {
        if let (true, Some(expr)) = (condition.skip, &condition.if_expr) {
            if !bindings.evaluate_condition(expr)? {
                return Ok(false);
            }
        }
    }
    Ok(true)
}

/// Collapse whitespace in every string of a resolved input.
fn compress(value: Value) -> Value {
    match value {
        Value::String(s) => Value::String(normalize(&s)),
        Value::Object(map) => Value::Object(map.into_iter().map(|(k, v)| (k, compress(v))).collect()),
        other => other,
    }
}

fn synthesis_input(query: &str, summaries: &[StepSummary]) -> String {
    let sections: String = summaries
        .iter()
        .map(|s| format!("\n## {}\n{}\n", s.step, s.summary))
        .collect();
    format!("Synthesize the findings below into one answer.\nQuery: {}\n{}", query, sections)
}

#[derive(Debug)]
enum Prepared {
    Skipped,
    Ready(Invocation),
}

/// Everything needed to invoke one step, detached from the run.
#[derive(Debug, Clone)]
struct Invocation {
    index: usize,
    request: ToolRequest,
    cache_key: Option<String>,
    attempts: u32,
    backoff: Duration,
    fail_on_error: bool,
    save_path: Option<PathBuf>,
}

struct Invoked {
    outcome: Outcome,
    duration: Duration,
}

enum Outcome {
    Produced {
        text: String,
        model: Option<String>,
        cost: f64,
        cached: bool,
    },
    /// Retries exhausted on a step that does not fail the run
    Absorbed(String),
    Fatal(Error),
}

struct StepFailure {
    /// Step index a resumed run starts from
    resume_at: usize,
    response: ErrorResponse,
}

impl StepFailure {
    fn new(resume_at: usize, step: &str, error: &Error) -> Self {
        Self {
            resume_at,
            response: ErrorResponse::from(error).with_step(step),
        }
    }
}

/// Mutable state of one run.
struct Run<'w> {
    workflow: &'w Workflow,
    graph: DependencyGraph,
    output_dir: PathBuf,
    manifest: WorkflowManifest,
    bindings: Bindings,
    summaries: Vec<StepSummary>,
    output: Option<FileReference>,
    checkpoints: Option<CheckpointPolicy>,
    report_path: Option<PathBuf>,
    summary_chars: usize,
}

impl<'w> Run<'w> {
    fn new(
        workflow: &'w Workflow,
        output_dir: PathBuf,
        manifest: WorkflowManifest,
        bindings: Bindings,
        config: &EngineConfig,
    ) -> Self {
        let settings = &workflow.settings.checkpoint;
        let checkpoints = settings
            .enabled
            .then(|| CheckpointPolicy::new(settings.token_interval, manifest.tokens));
        Self {
            workflow,
            graph: DependencyGraph::build(workflow),
            output_dir,
            manifest,
            bindings,
            summaries: Vec::new(),
            output: None,
            checkpoints,
            report_path: None,
            summary_chars: config.summary_chars,
        }
    }

    /// Rebuild summaries and the closing artifact from restored state.
    fn restore_summaries(&mut self) {
        for record in self.manifest.steps.iter().filter(|r| !r.skipped) {
            if let Some(file) = self.bindings.file(&record.name) {
                self.summaries.push(StepSummary {
                    step: record.name.clone(),
                    summary: file.summary.clone(),
                });
                self.output = Some(file.clone());
            }
        }
    }

    fn artifact_path(&self, step: &str) -> PathBuf {
        self.output_dir.join("steps").join(format!("{}.out", step))
    }

    fn bind(&mut self, step: &Step, file: FileReference) {
        if let Some(variable) = step.output_variable() {
            self.bindings.set_file(variable, file.clone());
        }
        self.bindings.set_file(&step.name, file);
    }

    /// Make a step's full output resident, from memory or from its artifact.
    fn load_file(&mut self, name: &str) -> Result<()> {
        let workflow = self.workflow;
        let source = workflow.get_step(name).ok_or_else(|| {
            Error::Execution(format!("loadFiles names unknown step '{}'", name))
        })?;
        let file = match self.bindings.file(name) {
            Some(file) => file.loaded()?,
            None => FileReference::load(
                name,
                &source.tool,
                &self.artifact_path(name),
                self.summary_chars,
            )?,
        };
        debug!(step = %name, bytes = file.size_bytes, "Loaded step output");
        self.bind(source, file);
        Ok(())
    }

    /// Commit an invocation outcome. Fatal outcomes and unwritable
    /// artifacts become a failure; `Err` only for manifest or checkpoint
    /// writes.
    fn settle(
        &mut self,
        step: &Step,
        invocation: &Invocation,
        invoked: Invoked,
    ) -> Result<Option<StepFailure>> {
        let duration_ms = u64::try_from(invoked.duration.as_millis()).unwrap_or(u64::MAX);
        metrics::record_step_duration(invoked.duration, &step.tool);

        let (text, model, cost, cached, absorbed) = match invoked.outcome {
            Outcome::Produced {
                text,
                model,
                cost,
                cached,
            } => (text, model, cost, cached, None),
            Outcome::Absorbed(message) => (String::new(), None, 0.0, false, Some(message)),
            Outcome::Fatal(e) => return self.fail(invocation.index, step, &e, duration_ms),
        };

        let file = if absorbed.is_some() {
            FileReference::empty(&step.name, &step.tool)
        } else {
            match FileReference::materialize(
                &step.name,
                &step.tool,
                model,
                text.clone(),
                self.summary_chars,
                invocation.save_path.as_deref(),
            ) {
                Ok(file) => file,
                Err(e) => return self.fail(invocation.index, step, &e, duration_ms),
            }
        };

        let mut record = StepRecord::from_file(&file, duration_ms);
        record.cached = cached;
        record.error = absorbed;
        metrics::record_step(match (&record.error, cached) {
            (Some(_), _) => "failed",
            (None, true) => "cached",
            (None, false) => "completed",
        });

        self.manifest.tokens += estimate_tokens(&text);
        self.manifest.total_cost += cost;
        self.summaries.push(StepSummary {
            step: step.name.clone(),
            summary: file.summary.clone(),
        });
        self.output = Some(file.clone());
        self.bind(step, file);
        self.push_record(record)?;

        let tokens = self.manifest.tokens;
        if self.checkpoints.as_mut().is_some_and(|policy| policy.due(tokens)) {
            self.checkpoint(invocation.index + 1)?;
        }
        Ok(None)
    }

    fn fail(
        &mut self,
        index: usize,
        step: &Step,
        error: &Error,
        duration_ms: u64,
    ) -> Result<Option<StepFailure>> {
        metrics::record_step("failed");
        let mut record = StepRecord::from_file(&FileReference::empty(&step.name, &step.tool), duration_ms);
        record.error = Some(error.to_string());
        self.push_record(record)?;
        Ok(Some(StepFailure::new(index, &step.name, error)))
    }

    fn commit_skipped(&mut self, step: &Step) -> Result<()> {
        let file = FileReference::empty(&step.name, &step.tool);
        let mut record = StepRecord::from_file(&file, 0);
        record.skipped = true;
        metrics::record_step("skipped");
        self.bind(step, file);
        self.push_record(record)
    }

    fn push_record(&mut self, record: StepRecord) -> Result<()> {
        self.manifest.steps.push(record);
        self.manifest.write(&self.output_dir)
    }

    fn checkpoint(&self, step_index: usize) -> Result<()> {
        let checkpoint = Checkpoint {
            workflow_id: self.manifest.workflow_id.clone(),
            step_index,
            bindings: self.bindings.evicted(),
            tokens: self.manifest.tokens,
            total_cost: self.manifest.total_cost,
            created_at: Utc::now(),
        };
        checkpoint.save(&self.output_dir)?;
        debug!(step_index, tokens = self.manifest.tokens, "Checkpoint written");
        Ok(())
    }

    /// Write the final report requested by `output.saveToFile`.
    fn write_report(&mut self) -> Result<()> {
        let workflow = self.workflow;
        let Some(output_spec) = &workflow.output else {
            return Ok(());
        };
        let path = match &output_spec.save_to_file {
            None | Some(SaveTarget::Enabled(false)) => return Ok(()),
            Some(SaveTarget::Enabled(true)) => self
                .output_dir
                .join(format!("report.{}", report_extension(output_spec.format))),
            Some(SaveTarget::Path(template)) => {
                let path = PathBuf::from(self.bindings.render(template));
                if path.components().any(|c| matches!(c, Component::ParentDir)) {
                    return Err(Error::Execution(format!(
                        "Report path '{}' must not contain '..'",
                        path.display()
                    )));
                }
                if path.is_relative() {
                    self.output_dir.join(path)
                } else {
                    path
                }
            }
        };
        let body = self.render_report(output_spec)?;
        atomic_write(&path, body.as_bytes())?;
        info!(path = %path.display(), "Report written");
        self.report_path = Some(path);
        Ok(())
    }

    fn render_report(&self, output_spec: &OutputSpec) -> Result<String> {
        let sections: Vec<(&str, String)> = self
            .summaries
            .iter()
            .map(|s| {
                let body = if output_spec.truncate_steps {
                    s.summary.clone()
                } else {
                    self.full_text(&s.step).unwrap_or_else(|| s.summary.clone())
                };
                (s.step.as_str(), body)
            })
            .collect();

        let body = match output_spec.format {
            OutputFormat::Markdown => {
                let steps: String = sections
                    .iter()
                    .map(|(step, body)| format!("\n## {}\n\n{}\n", step, body))
                    .collect();
                format!("# {}\n{}", self.workflow.name, steps)
            }
            OutputFormat::Text => sections
                .iter()
                .map(|(step, body)| format!("{}:\n{}\n", step, body))
                .collect::<Vec<_>>()
                .join("\n"),
            OutputFormat::Json => {
                let steps: Vec<Value> = sections
                    .iter()
                    .map(|(step, body)| json!({ "step": step, "content": body }))
                    .collect();
                serde_json::to_string_pretty(&json!({
                    "workflow": self.workflow.name,
                    "workflowId": self.manifest.workflow_id,
                    "steps": steps,
                }))?
            }
        };
        Ok(body)
    }

    fn full_text(&self, step: &str) -> Option<String> {
        self.bindings.file(step)?.loaded().ok()?.content
    }

    fn into_record(self) -> ExecutionRecord {
        ExecutionRecord {
            manifest: self.manifest,
            output_dir: self.output_dir,
            summaries: self.summaries,
            output: self.output,
            report_path: self.report_path,
        }
    }
}

fn report_extension(format: OutputFormat) -> &'static str {
    match format {
        OutputFormat::Markdown => "md",
        OutputFormat::Json => "json",
        OutputFormat::Text => "txt",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{summarize, CallPolicy, ProviderRouter};
    use crate::tools::ToolRegistry;
    use crate::validation::WorkflowValidator;
    use crate::workflow::WorkflowFormat;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tokio::sync::Barrier;

    const TOOLS: [&str; 7] = ["search", "llm", "flaky", "broken", "hang", "gather", "synthesize"];

    /// `flaky` fails unless healthy, `broken` always fails without hope of
    /// recovery, `hang` never answers in time, `gather` waits until two
    /// calls are in flight, everything else echoes.
    struct FakeTool {
        healthy: bool,
        calls: AtomicUsize,
        order: Mutex<Vec<String>>,
        barrier: Barrier,
    }

    impl FakeTool {
        fn new() -> Arc<Self> {
            Self::build(false)
        }

        fn healthy() -> Arc<Self> {
            Self::build(true)
        }

        fn build(healthy: bool) -> Arc<Self> {
            Arc::new(Self {
                healthy,
                calls: AtomicUsize::new(0),
                order: Mutex::new(Vec::new()),
                barrier: Barrier::new(2),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn order(&self) -> Vec<String> {
            self.order.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ToolCallable for FakeTool {
        async fn call(&self, request: &ToolRequest) -> Result<ToolOutput> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.order.lock().unwrap().push(request.step.clone());
            match request.tool.as_str() {
                "flaky" if !self.healthy => Err(Error::Tool("backend unavailable".into())),
                "broken" => Err(Error::Execution("unsupported input".into())),
                "hang" => {
                    sleep(Duration::from_secs(30)).await;
                    Ok(ToolOutput::text("late"))
                }
                "gather" => {
                    self.barrier.wait().await;
                    Ok(ToolOutput::text(format!("[{}]", request.step)))
                }
                _ => Ok(ToolOutput::text(format!("[{}] {}", request.step, request.input_text()))
                    .with_cost(0.01)),
            }
        }
    }

    fn validated(yaml: &str) -> ValidatedWorkflow {
        WorkflowValidator::new(ToolRegistry::new(TOOLS))
            .validate(yaml, WorkflowFormat::Yaml)
            .into_validated()
            .unwrap()
    }

    fn executor(tool: Arc<FakeTool>, root: &Path) -> Executor {
        Executor::new(tool).with_config(EngineConfig {
            output_root: Some(root.to_path_buf()),
            ..EngineConfig::default()
        })
    }

    const LINEAR: &str = r#"
name: brief
steps:
  - name: fetch
    tool: search
    input: "${query}"
  - name: summarize
    tool: llm
    input: "Summarize: ${fetch.output}"
"#;

    #[tokio::test]
    async fn test_linear_workflow_runs_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let tool = FakeTool::new();
        let record = executor(tool.clone(), dir.path())
            .execute(&validated(LINEAR), RunInput::new("rust async"))
            .await
            .unwrap();

        assert_eq!(record.status(), RunStatus::Completed);
        assert_eq!(tool.order(), vec!["fetch", "summarize"]);
        assert_eq!(
            record.summary("summarize"),
            Some("[summarize] Summarize: [fetch] rust async")
        );
        assert!((record.manifest.total_cost - 0.02).abs() < 1e-9);
        assert!(record.output_dir.starts_with(dir.path()));

        let on_disk = WorkflowManifest::load(&record.output_dir).unwrap();
        assert_eq!(on_disk.status, RunStatus::Completed);
        assert_eq!(on_disk.steps.len(), 2);
        assert!(on_disk.end_time.is_some());
        assert!(!Checkpoint::path(&record.output_dir).exists());
    }

    #[tokio::test]
    async fn test_retry_exhaustion_without_fail_on_error_completes() {
        let dir = tempfile::tempdir().unwrap();
        let tool = FakeTool::new();
        let workflow = validated(
            r#"
name: resilient
steps:
  - name: fetch
    tool: flaky
    retry:
      attempts: 2
      backoff: 1
  - name: summarize
    tool: llm
    input: "Summarize: ${fetch}"
"#,
        );
        let record = executor(tool.clone(), dir.path())
            .execute(&workflow, RunInput::new("q"))
            .await
            .unwrap();

        assert_eq!(record.status(), RunStatus::Completed);
        assert_eq!(tool.calls(), 3);
        let fetch = record.step("fetch").unwrap();
        assert!(fetch.error.as_deref().unwrap().contains("backend unavailable"));
        assert_eq!(record.summary("fetch"), Some(""));
        assert_eq!(record.summary("summarize"), Some("[summarize] Summarize: "));
    }

    #[tokio::test]
    async fn test_fail_on_error_fails_run() {
        let dir = tempfile::tempdir().unwrap();
        let tool = FakeTool::new();
        let workflow = validated(
            r#"
name: strict
steps:
  - name: fetch
    tool: flaky
    condition:
      failOnError: true
  - name: summarize
    tool: llm
    input: "${fetch}"
"#,
        );
        let record = executor(tool.clone(), dir.path())
            .execute(&workflow, RunInput::new("q"))
            .await
            .unwrap();

        assert_eq!(record.status(), RunStatus::Failed);
        let error = record.error().unwrap();
        assert_eq!(error.code, "TOOL_ERROR");
        assert_eq!(error.step.as_deref(), Some("fetch"));
        assert_eq!(tool.calls(), 1);

        let on_disk = WorkflowManifest::load(&record.output_dir).unwrap();
        assert_eq!(on_disk.status, RunStatus::Failed);
        assert_eq!(on_disk.error.as_ref().map(|e| e.code.as_str()), Some("TOOL_ERROR"));
    }

    #[tokio::test]
    async fn test_cached_result_skips_tool_and_is_identical() {
        let dir = tempfile::tempdir().unwrap();
        let tool = FakeTool::new();
        let workflow = validated(
            r#"
name: cached
settings:
  optimization:
    enabled: true
    cacheResults: true
steps:
  - name: answer
    tool: llm
    input: "What is ${query}?"
"#,
        );
        let executor = executor(tool.clone(), dir.path());

        let first = executor.execute(&workflow, RunInput::new("rust")).await.unwrap();
        let second = executor.execute(&workflow, RunInput::new("rust")).await.unwrap();

        assert_eq!(tool.calls(), 1);
        assert!(!first.step("answer").unwrap().cached);
        assert!(second.step("answer").unwrap().cached);
        assert_eq!(
            first.output.as_ref().unwrap().content,
            second.output.as_ref().unwrap().content
        );
        assert_ne!(first.workflow_id(), second.workflow_id());
    }

    #[tokio::test]
    async fn test_false_condition_skips_step() {
        let dir = tempfile::tempdir().unwrap();
        let tool = FakeTool::new();
        let workflow = validated(
            r#"
name: gated
variables:
  mode: quick
steps:
  - name: fetch
    tool: search
    input: "${query}"
  - name: deep_dive
    tool: llm
    when: '${mode} == "deep"'
    input: "${fetch}"
  - name: report
    tool: llm
    input: "${fetch}|${deep_dive}"
"#,
        );
        let record = executor(tool.clone(), dir.path())
            .execute(&workflow, RunInput::new("q"))
            .await
            .unwrap();

        assert_eq!(record.status(), RunStatus::Completed);
        assert_eq!(tool.order(), vec!["fetch", "report"]);
        assert!(record.step("deep_dive").unwrap().skipped);
        assert_eq!(record.summary("report"), Some("[report] [fetch] q|"));
    }

    #[tokio::test]
    async fn test_saved_output_is_loaded_in_full() {
        let dir = tempfile::tempdir().unwrap();
        let tool = FakeTool::new();
        let workflow = validated(
            r#"
name: files
steps:
  - name: fetch
    tool: search
    input: "${query}"
    saveToFile: true
  - name: digest
    tool: llm
    loadFiles: [fetch]
    input: "Digest: ${fetch}"
"#,
        );
        let record = Executor::new(tool)
            .with_config(EngineConfig {
                output_root: Some(dir.path().to_path_buf()),
                summary_chars: 10,
                ..EngineConfig::default()
            })
            .execute(&workflow, RunInput::new("a long research question"))
            .await
            .unwrap();

        let artifact = record.output_dir.join("steps/fetch.out");
        let full = std::fs::read_to_string(&artifact).unwrap();
        assert_eq!(full, "[fetch] a long research question");
        assert_eq!(record.step("fetch").unwrap().file_path.as_deref(), Some(artifact.as_path()));
        assert_eq!(record.summary("fetch"), Some(summarize(&full, 10).as_str()));

        let output = record.output.unwrap();
        assert_eq!(output.step, "digest");
        assert_eq!(
            output.content.as_deref(),
            Some("[digest] Digest: [fetch] a long research question")
        );
    }

    #[tokio::test]
    async fn test_resume_from_checkpoint_after_failure() {
        let dir = tempfile::tempdir().unwrap();
        let workflow = validated(
            r#"
name: resumable
settings:
  checkpoint:
    enabled: true
    tokenInterval: 1
steps:
  - name: fetch
    tool: search
    input: "${query}"
  - name: analyze
    tool: flaky
    input: "${fetch}"
    condition:
      failOnError: true
  - name: report
    tool: llm
    input: "${analyze}"
"#,
        );

        let failed = executor(FakeTool::new(), dir.path())
            .execute(&workflow, RunInput::new("q"))
            .await
            .unwrap();
        assert_eq!(failed.status(), RunStatus::Failed);
        let checkpoint = Checkpoint::load(&failed.output_dir).unwrap().unwrap();
        assert_eq!(checkpoint.step_index, 1);

        let tool = FakeTool::healthy();
        let resumed = executor(tool.clone(), dir.path())
            .resume(&workflow, &failed.output_dir)
            .await
            .unwrap();

        assert_eq!(resumed.status(), RunStatus::Completed);
        assert_eq!(resumed.workflow_id(), failed.workflow_id());
        assert_eq!(tool.order(), vec!["analyze", "report"]);
        assert_eq!(resumed.summary("report"), Some("[report] [analyze] [fetch] q"));
        let names: Vec<&str> = resumed.manifest.steps.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["fetch", "analyze", "report"]);
        assert!(resumed.error().is_none());
        assert!(Checkpoint::load(&resumed.output_dir).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_resume_without_checkpoint_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let record = executor(FakeTool::new(), dir.path())
            .execute(&validated(LINEAR), RunInput::new("q"))
            .await
            .unwrap();
        let err = executor(FakeTool::new(), dir.path())
            .resume(&validated(LINEAR), &record.output_dir)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "EXECUTION_ERROR");
    }

    const HANGING: &str = r#"
name: slow
steps:
  - name: wait
    tool: hang
    input: "${query}"
    condition:
      failOnError: true
"#;

    #[tokio::test]
    async fn test_cancellation_abandons_call() {
        let dir = tempfile::tempdir().unwrap();
        let cancel = CancelSignal::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let record = executor(FakeTool::new(), dir.path())
            .with_cancel(cancel)
            .execute(&validated(HANGING), RunInput::new("q"))
            .await
            .unwrap();

        assert_eq!(record.status(), RunStatus::Failed);
        assert_eq!(record.error().unwrap().code, "CANCELLED");
    }

    #[tokio::test]
    async fn test_invocation_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let record = executor(FakeTool::new(), dir.path())
            .with_invocation_timeout(Duration::from_millis(50))
            .execute(&validated(HANGING), RunInput::new("q"))
            .await
            .unwrap();

        assert_eq!(record.status(), RunStatus::Failed);
        assert_eq!(record.error().unwrap().code, "TIMEOUT");
    }

    #[tokio::test]
    async fn test_parallel_steps_run_concurrently() {
        let dir = tempfile::tempdir().unwrap();
        let workflow = validated(
            r#"
name: fanout
steps:
  - name: news
    tool: gather
    parallel: true
    input: "news about ${query}"
  - name: papers
    tool: gather
    parallel: true
    input: "papers about ${query}"
  - name: combine
    tool: llm
    input: "${news} ${papers}"
"#,
        );
        // Sequential calls would each wait for a partner until timing out.
        let record = executor(FakeTool::new(), dir.path())
            .with_invocation_timeout(Duration::from_secs(5))
            .execute(&workflow, RunInput::new("q"))
            .await
            .unwrap();

        assert_eq!(record.status(), RunStatus::Completed);
        assert!(record.step("news").unwrap().error.is_none());
        assert!(record.step("papers").unwrap().error.is_none());
        let names: Vec<&str> = record.manifest.steps.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["news", "papers", "combine"]);
        assert_eq!(record.summary("combine"), Some("[combine] [news] [papers]"));
    }

    #[tokio::test]
    async fn test_auto_synthesis_closes_run() {
        let dir = tempfile::tempdir().unwrap();
        let tool = FakeTool::new();
        let workflow = validated(
            r#"
name: long
settings:
  autoSynthesis:
    enabled: true
    tokenThreshold: 1
    backoff: 1
steps:
  - name: fetch
    tool: search
    input: "${query}"
"#,
        );
        let record = executor(tool.clone(), dir.path())
            .execute(&workflow, RunInput::new("topic"))
            .await
            .unwrap();

        assert_eq!(tool.order(), vec!["fetch", SYNTHESIS_STEP]);
        let synthesis = record.step(SYNTHESIS_STEP).unwrap();
        assert_eq!(synthesis.tool, "synthesize");
        assert!(synthesis.file_path.as_ref().unwrap().exists());
        assert_eq!(record.output.as_ref().unwrap().step, SYNTHESIS_STEP);
        assert!(record.summary(SYNTHESIS_STEP).unwrap().contains("[fetch] topic"));
    }

    #[tokio::test]
    async fn test_routing_and_compression() {
        let dir = tempfile::tempdir().unwrap();
        let workflow = validated(
            r#"
name: tuned
settings:
  optimization:
    enabled: true
    compressPrompts: true
    smartRouting: true
steps:
  - name: answer
    tool: llm
    input: "  lots   of
      space  ${query}"
"#,
        );
        let record = executor(FakeTool::new(), dir.path())
            .execute(&workflow, RunInput::new("here"))
            .await
            .unwrap();

        let answer = record.step("answer").unwrap();
        assert_eq!(answer.model.as_deref(), Some("fast"));
        assert_eq!(record.summary("answer"), Some("[answer] lots of space here"));
    }

    #[tokio::test]
    async fn test_report_written_to_templated_path() {
        let dir = tempfile::tempdir().unwrap();
        let workflow = validated(
            r#"
name: reported
output:
  format: markdown
  saveToFile: "reports/${query}.md"
steps:
  - name: fetch
    tool: search
    input: "${query}"
"#,
        );
        let record = executor(FakeTool::new(), dir.path())
            .execute(&workflow, RunInput::new("daily"))
            .await
            .unwrap();

        let path = record.report_path.clone().unwrap();
        assert_eq!(path, record.output_dir.join("reports/daily.md"));
        let report = std::fs::read_to_string(path).unwrap();
        assert!(report.starts_with("# reported\n"));
        assert!(report.contains("## fetch\n\n[fetch] daily"));
    }

    #[tokio::test]
    async fn test_non_retryable_error_stops_retries() {
        let dir = tempfile::tempdir().unwrap();
        let tool = FakeTool::new();
        let workflow = validated(
            r#"
name: hopeless
steps:
  - name: convert
    tool: broken
    input: "${query}"
    retry:
      attempts: 3
      backoff: 1
"#,
        );
        let record = executor(tool.clone(), dir.path())
            .execute(&workflow, RunInput::new("q"))
            .await
            .unwrap();

        assert_eq!(record.status(), RunStatus::Completed);
        assert_eq!(tool.calls(), 1);
        let convert = record.step("convert").unwrap();
        assert!(convert.error.as_deref().unwrap().contains("unsupported input"));
    }

    #[tokio::test]
    async fn test_resume_loads_saved_artifact_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let workflow = validated(
            r#"
name: reloaded
settings:
  checkpoint:
    enabled: true
    tokenInterval: 1
steps:
  - name: fetch
    tool: search
    input: "${query}"
    saveToFile: true
  - name: analyze
    tool: flaky
    loadFiles: [fetch]
    input: "Analyze: ${fetch}"
    condition:
      failOnError: true
"#,
        );
        let config = EngineConfig {
            output_root: Some(dir.path().to_path_buf()),
            summary_chars: 10,
            ..EngineConfig::default()
        };

        let failed = Executor::new(FakeTool::new())
            .with_config(config.clone())
            .execute(&workflow, RunInput::new("a long research question"))
            .await
            .unwrap();
        assert_eq!(failed.status(), RunStatus::Failed);
        let checkpoint = Checkpoint::load(&failed.output_dir).unwrap().unwrap();
        let fetch = checkpoint.bindings.file("fetch").unwrap();
        assert!(!fetch.is_resident());
        assert_eq!(fetch.summary, summarize("[fetch] a long research question", 10));

        let tool = FakeTool::healthy();
        let resumed = Executor::new(tool.clone())
            .with_config(config)
            .resume(&workflow, &failed.output_dir)
            .await
            .unwrap();

        assert_eq!(resumed.status(), RunStatus::Completed);
        assert_eq!(tool.order(), vec!["analyze"]);
        assert_eq!(
            resumed.output.as_ref().unwrap().content.as_deref(),
            Some("[analyze] Analyze: [fetch] a long research question")
        );
    }

    #[tokio::test]
    async fn test_parallel_step_waits_for_output_variable() {
        let dir = tempfile::tempdir().unwrap();
        let tool = FakeTool::new();
        let workflow = validated(
            r#"
name: drafting
steps:
  - name: research
    tool: search
    parallel: true
    input: "${query}"
    output:
      variable: notes
  - name: draft
    tool: llm
    parallel: true
    input: "Draft from ${notes}"
  - name: final
    tool: llm
    input: "${draft}"
"#,
        );
        let record = executor(tool.clone(), dir.path())
            .execute(&workflow, RunInput::new("q"))
            .await
            .unwrap();

        assert_eq!(record.status(), RunStatus::Completed);
        assert_eq!(tool.order(), vec!["research", "draft", "final"]);
        assert_eq!(record.summary("draft"), Some("[draft] Draft from [research] q"));
    }

    #[tokio::test]
    async fn test_provider_router_fails_over_within_step() {
        let dir = tempfile::tempdir().unwrap();
        let primary = FakeTool::new();
        let backup = FakeTool::healthy();
        let router = ProviderRouter::<Arc<dyn ToolCallable>>::new(CallPolicy::default())
            .with_provider("primary", 0, primary.clone())
            .with_provider("backup", 1, backup.clone());
        let workflow = validated(
            r#"
name: failover
steps:
  - name: analyze
    tool: flaky
    input: "${query}"
    condition:
      failOnError: true
"#,
        );

        let record = Executor::new(Arc::new(router))
            .with_config(EngineConfig {
                output_root: Some(dir.path().to_path_buf()),
                ..EngineConfig::default()
            })
            .execute(&workflow, RunInput::new("q"))
            .await
            .unwrap();

        assert_eq!(record.status(), RunStatus::Completed);
        assert_eq!(primary.calls(), 1);
        assert_eq!(backup.calls(), 1);
        let analyze = record.step("analyze").unwrap();
        assert_eq!(analyze.model.as_deref(), Some("backup"));
        assert!(analyze.error.is_none());
        assert_eq!(record.summary("analyze"), Some("[analyze] q"));
    }

    #[tokio::test]
    async fn test_exhausted_providers_fail_run() {
        let dir = tempfile::tempdir().unwrap();
        let router = ProviderRouter::<Arc<dyn ToolCallable>>::new(CallPolicy::default())
            .with_provider("primary", 0, FakeTool::new())
            .with_provider("backup", 1, FakeTool::new());
        let workflow = validated(
            r#"
name: failover
steps:
  - name: analyze
    tool: flaky
    input: "${query}"
    condition:
      failOnError: true
"#,
        );

        let record = Executor::new(Arc::new(router))
            .with_config(EngineConfig {
                output_root: Some(dir.path().to_path_buf()),
                ..EngineConfig::default()
            })
            .execute(&workflow, RunInput::new("q"))
            .await
            .unwrap();

        assert_eq!(record.status(), RunStatus::Failed);
        let on_disk = WorkflowManifest::load(&record.output_dir).unwrap();
        let error = on_disk.error.unwrap();
        assert_eq!(error.code, "ALL_PROVIDERS_FAILED");
        assert_eq!(error.step.as_deref(), Some("analyze"));
    }

    #[tokio::test]
    async fn test_report_path_cannot_leave_run_directory() {
        let dir = tempfile::tempdir().unwrap();
        let workflow = validated(
            r#"
name: reported
output:
  saveToFile: "reports/${query}.md"
steps:
  - name: fetch
    tool: search
    input: "${query}"
"#,
        );
        let record = executor(FakeTool::new(), dir.path())
            .execute(&workflow, RunInput::new("../../outside"))
            .await
            .unwrap();

        assert_eq!(record.status(), RunStatus::Failed);
        let error = record.error().unwrap();
        assert_eq!(error.code, "EXECUTION_ERROR");
        assert_eq!(error.step.as_deref(), Some("output"));
        assert!(record.report_path.is_none());
        assert!(!dir.path().join("outside.md").exists());
    }

    #[test]
    fn test_workflow_ids_sort_by_time() {
        let id = new_workflow_id();
        let (stamp, random) = id.split_once('-').unwrap();
        assert_eq!(stamp.len(), "20260101T000000000Z".len());
        assert!(stamp.ends_with('Z'));
        assert_eq!(random.len(), 8);
    }
}
