use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use tokio::sync::broadcast::Receiver;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use braid_core::config::AppConfig;
use braid_core::event::{self, SpanBus};
use braid_core::traits::{ConditionEvaluator, NullSink, ObservabilitySink};
use braid_core::types::{TaskSpan, Variables};

use braid_engine::{
    builtin_agent, loader, Context, Engine, ExpressionEvaluator, FanoutSink, JsonlSpanSink,
    TracingSink,
};

#[derive(Parser)]
#[command(name = "braid", version, about = "BPMN-style workflow interpreter")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "braid.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check that a process definition loads and has a start event
    Validate {
        /// Definition file (.json or .toml)
        file: PathBuf,
    },
    /// Execute a process definition with built-in executors
    Run {
        /// Definition file (.json or .toml)
        file: PathBuf,
        /// Initial variable as key=value (value parsed as JSON when possible)
        #[arg(long = "var", value_parser = parse_var)]
        vars: Vec<(String, serde_json::Value)>,
        /// Initial variables as a JSON object
        #[arg(long)]
        vars_json: Option<String>,
        /// Register the definition under this id instead of its own
        #[arg(long)]
        process: Option<String>,
    },
    /// Show current configuration
    Config,
}

fn parse_var(raw: &str) -> Result<(String, serde_json::Value), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{}'", raw))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty variable name in '{}'", raw));
    }
    let value = serde_json::from_str(value)
        .unwrap_or_else(|_| serde_json::Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

fn load_config(path: &Path) -> anyhow::Result<AppConfig> {
    if path.exists() {
        return AppConfig::load(path).with_context(|| format!("loading {}", path.display()));
    }
    Ok(AppConfig::default())
}

/// Span sink stack for a run, plus a subscription to its span bus when
/// spans are enabled.
fn build_sink(
    config: &AppConfig,
) -> anyhow::Result<(Arc<dyn ObservabilitySink>, Option<Receiver<TaskSpan>>)> {
    if !config.spans.enabled {
        return Ok((Arc::new(NullSink), None));
    }

    let bus = SpanBus::new(config.spans.bus_capacity.max(1));
    let receiver = bus.subscribe();

    let mut fanout = FanoutSink::new()
        .with(Arc::new(TracingSink))
        .with(Arc::new(bus));
    if let Some(ref path) = config.spans.jsonl_path {
        let sink = JsonlSpanSink::open(path)
            .with_context(|| format!("opening span log {}", path))?;
        fanout = fanout.with(Arc::new(sink));
    }
    Ok((Arc::new(fanout), Some(receiver)))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.log.filter)),
        )
        .with_target(false)
        .init();

    debug!(config = %cli.config.display(), "Configuration resolved");

    match cli.command {
        Commands::Validate { file } => {
            let definition = loader::load_file(&file)
                .with_context(|| format!("loading {}", file.display()))?;
            let start = definition.start_element()?;
            println!(
                "{}: ok ({} elements, {} flows, start '{}')",
                definition.id,
                definition.elements().len(),
                definition.flows().len(),
                start.id
            );
            Ok(())
        }
        Commands::Run {
            file,
            vars,
            vars_json,
            process,
        } => {
            let definition = loader::load_file(&file)
                .with_context(|| format!("loading {}", file.display()))?;

            let mut initial = match vars_json {
                Some(raw) => serde_json::from_str::<Variables>(&raw)
                    .context("--vars-json must be a JSON object")?,
                None => Variables::new(),
            };
            initial.extend(vars);

            let (sink, mut spans) = build_sink(&config)?;
            let evaluator: Arc<dyn ConditionEvaluator> = Arc::new(ExpressionEvaluator);
            let mut engine =
                Engine::new(evaluator.clone(), config.engine.clone()).with_sink(sink.clone());
            for agent_id in definition.agent_refs() {
                engine.register_agent(
                    agent_id,
                    Arc::new(builtin_agent(sink.clone(), evaluator.clone())),
                );
            }

            let process_id = process.unwrap_or_else(|| definition.id.clone());
            engine.load_process(process_id.clone(), definition);

            let mut context = engine.new_context(&process_id, initial)?;
            let outcome = engine.run(&mut context).await;
            let spans = match spans.as_mut() {
                Some(rx) => {
                    let (spans, skipped) = event::drain(rx);
                    if skipped > 0 {
                        warn!(skipped, "Span bus overflowed, raise spans.bus_capacity");
                    }
                    spans
                }
                None => Vec::new(),
            };

            match outcome {
                Ok(()) => {
                    info!(instance_id = %context.instance_id, "Run finished");
                    println!(
                        "{}",
                        serde_json::to_string_pretty(&report(&context, &spans))?
                    );
                    Ok(())
                }
                Err(e) => {
                    error!(
                        element_id = e.element_id().unwrap_or("-"),
                        path = ?context.path(),
                        failed_tasks = spans.iter().filter(|s| !s.success).count(),
                        "Run failed"
                    );
                    Err(e.into())
                }
            }
        }
        Commands::Config => {
            println!("{}", toml::to_string_pretty(&config)?);
            Ok(())
        }
    }
}

fn report(context: &Context, spans: &[TaskSpan]) -> serde_json::Value {
    let tasks: Vec<serde_json::Value> = spans
        .iter()
        .map(|s| {
            serde_json::json!({
                "task_id": s.task_id,
                "instance_id": s.instance_id,
                "success": s.success,
                "elapsed_ms": s.elapsed_ms(),
            })
        })
        .collect();

    serde_json::json!({
        "process_id": context.process_id,
        "instance_id": context.instance_id.0,
        "path": context.path(),
        "variables": context.variables(),
        "tasks": tasks,
    })
}
