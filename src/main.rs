use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use stepwright::config::Config;
use stepwright::engine::{ExecutionRecord, Executor, ResultCache, RunInput, RunStatus};
use stepwright::shutdown::CancelSignal;
use stepwright::telemetry::{init_logging, LogConfig};
use stepwright::tools::{EchoTool, ToolRegistry, ToolSet};
use stepwright::validation::{ValidatedWorkflow, ValidationReport, WorkflowValidator};
use stepwright::workflow::{parse_workflow_file, DependencyGraph, WorkflowFormat};

#[derive(Parser)]
#[command(name = "stepwright")]
#[command(about = "Validate and run multi-step LLM tool workflows", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a workflow file and print the findings
    Validate {
        /// Path to workflow YAML or JSON file
        file: PathBuf,
        /// Override format detection from the file extension
        #[arg(long, value_enum)]
        format: Option<FormatArg>,
        /// Known tool names (default: from configuration)
        #[arg(long = "tool")]
        tools: Vec<String>,
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print the step dependency graph
    Graph {
        /// Path to workflow YAML or JSON file
        file: PathBuf,
    },
    /// Validate and execute a workflow with the echo tool
    Run {
        /// Path to workflow YAML or JSON file
        file: PathBuf,
        /// Run query, bound as ${query} and ${input}
        #[arg(short, long, default_value = "")]
        query: String,
        /// Extra variables (key=value)
        #[arg(long = "var", value_parser = parse_var)]
        vars: Vec<(String, String)>,
    },
    /// Continue a failed or interrupted run from its checkpoint
    Resume {
        /// Path to the workflow file the run was started from
        file: PathBuf,
        /// Run directory holding manifest.json and checkpoint.json
        run_dir: PathBuf,
    },
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
enum FormatArg {
    Yaml,
    Json,
}

impl From<FormatArg> for WorkflowFormat {
    fn from(format: FormatArg) -> Self {
        match format {
            FormatArg::Yaml => WorkflowFormat::Yaml,
            FormatArg::Json => WorkflowFormat::Json,
        }
    }
}

fn parse_var(s: &str) -> std::result::Result<(String, String), String> {
    let pos = s
        .find('=')
        .ok_or_else(|| format!("Invalid variable format '{}'. Expected key=value", s))?;
    Ok((s[..pos].to_string(), s[pos + 1..].to_string()))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = init_logging(&LogConfig::default()) {
        eprintln!("Warning: failed to initialise logging: {}", e);
    }

    let cli = Cli::parse();
    let config = Config::load();

    match cli.command {
        Commands::Validate {
            file,
            format,
            tools,
            json,
        } => cmd_validate(&config, &file, format, tools, json)?,
        Commands::Graph { file } => cmd_graph(&file)?,
        Commands::Run { file, query, vars } => cmd_run(config, &file, query, vars).await?,
        Commands::Resume { file, run_dir } => cmd_resume(config, &file, &run_dir).await?,
    }

    Ok(())
}

fn cmd_validate(
    config: &Config,
    file: &Path,
    format: Option<FormatArg>,
    tools: Vec<String>,
    json: bool,
) -> anyhow::Result<()> {
    let registry = if tools.is_empty() {
        ToolRegistry::from_config(&config.tools)
    } else {
        ToolRegistry::new(tools)
    };
    let text = std::fs::read_to_string(file)?;
    let format = format
        .map(WorkflowFormat::from)
        .unwrap_or_else(|| WorkflowFormat::from_path(file));
    let report = WorkflowValidator::new(registry).validate(&text, format);

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }

    if !report.valid {
        anyhow::bail!("{} has {} blocking error(s)", file.display(), report.errors.len());
    }
    Ok(())
}

fn print_report(report: &ValidationReport) {
    for finding in report.errors.iter().chain(report.warnings.iter()) {
        println!("{}", finding);
    }
    if report.valid {
        println!("✓ Workflow is valid ({} warning(s))", report.warnings.len());
    } else {
        println!(
            "✗ Workflow is invalid: {} error(s), {} warning(s)",
            report.errors.len(),
            report.warnings.len()
        );
    }
}

fn cmd_graph(file: &Path) -> anyhow::Result<()> {
    let workflow = parse_workflow_file(file)?;
    let graph = DependencyGraph::build(&workflow);

    println!("Workflow: {}", workflow.name);
    println!();
    println!("Edges (dependent -> dependency):");
    for edge in graph.edges() {
        println!(
            "  {} -> {} ({})",
            graph.name(edge.from),
            graph.name(edge.to),
            edge.kind
        );
    }
    println!();

    let cycles = graph.find_cycles();
    if cycles.is_empty() {
        let order = graph.topological_order().unwrap_or_default();
        let names: Vec<&str> = order.iter().map(|&n| graph.name(n)).collect();
        println!("Dependency order: {}", names.join(", "));
    } else {
        for cycle in &cycles {
            println!("Cycle: {}", graph.render_path(cycle));
        }
    }
    let declared: Vec<&str> = workflow.steps.iter().map(|s| s.name.as_str()).collect();
    println!("Declared order: {}", declared.join(", "));

    Ok(())
}

fn load_validated(config: &Config, file: &Path) -> anyhow::Result<ValidatedWorkflow> {
    let validator = WorkflowValidator::new(ToolRegistry::from_config(&config.tools));
    let report = validator.validate_file(file)?;
    for warning in &report.warnings {
        eprintln!("{}", warning);
    }
    Ok(report.into_validated()?)
}

fn build_executor(config: Config) -> Executor {
    let cancel = CancelSignal::new();
    cancel.cancel_on_ctrl_c();
    let tools = ToolSet::new().with_fallback(Arc::new(EchoTool::new()));
    Executor::new(Arc::new(tools))
        .with_cache(ResultCache::from_config(&config.engine))
        .with_config(config.engine)
        .with_cancel(cancel)
}

async fn cmd_run(
    config: Config,
    file: &Path,
    query: String,
    vars: Vec<(String, String)>,
) -> anyhow::Result<()> {
    let workflow = load_validated(&config, file)?;
    let input = vars
        .into_iter()
        .fold(RunInput::new(query), |input, (k, v)| input.with_variable(k, v));

    let record = build_executor(config).execute(&workflow, input).await?;
    finish(&record)
}

async fn cmd_resume(config: Config, file: &Path, run_dir: &Path) -> anyhow::Result<()> {
    let workflow = load_validated(&config, file)?;
    let record = build_executor(config).resume(&workflow, run_dir).await?;
    finish(&record)
}

fn finish(record: &ExecutionRecord) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(record)?);
    if record.status() == RunStatus::Failed {
        let message = record
            .error()
            .map(|e| e.message.clone())
            .unwrap_or_else(|| "unknown error".to_string());
        anyhow::bail!("Run {} failed: {}", record.workflow_id(), message);
    }
    Ok(())
}
