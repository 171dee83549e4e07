//! TraceSink CLI
//!
//! Drives the trace export pipeline from the command line: a simulated agent
//! run, replay of recorded trace items, or plain rendering of a file.

use std::ffi::OsString;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use tracesink::config::LoggingConfig;
use tracesink::demo::{self, DemoRun};
use tracesink::export::{ConsoleExporter, TracingExporter};
use tracesink::models::{read_jsonl, TraceItem};
use tracesink::processor::{
    emit_span_end, emit_trace_start, set_trace_processors, set_tracing_disabled,
    BatchTraceProcessor, ProcessorGuard,
};
use tracesink::{Config, Error};

/// TraceSink - console trace export for AI agent runs
#[derive(Parser)]
#[command(name = "tracesink")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, global = true, env = "TRACESINK_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Simulate one agent run and print its trace
    Demo {
        /// User prompt
        #[arg(long, default_value = "Hello, how can you assist me today")]
        prompt: String,

        /// Model name recorded on the generation span
        #[arg(long, default_value = "gemini-2.0-flash")]
        model: String,

        /// Agent name
        #[arg(long, default_value = "MyAgent")]
        agent: String,
    },

    /// Push recorded trace items (JSON lines) through the batch processor
    Replay {
        /// File with one trace item per line
        file: PathBuf,
    },

    /// Render recorded trace items (JSON lines) directly, without batching
    Render {
        /// File with one trace item per line
        file: PathBuf,
    },

    /// Print the effective configuration
    Config,

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

fn main() -> ExitCode {
    let cli = parse_args(std::env::args_os());

    // Load configuration
    let config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error loading configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    init_logging(&config.logging, cli.verbose);

    // Execute command
    let result = match cli.command {
        Commands::Demo {
            prompt,
            model,
            agent,
        } => run_demo(&config, prompt, model, agent),
        Commands::Replay { file } => run_replay(&config, &file),
        Commands::Render { file } => run_render(&config, &file),
        Commands::Config => run_config(&config),
        Commands::Completions { shell } => {
            generate_completions(shell);
            Ok(())
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Parse CLI arguments, with `.env` loaded first so it can feed `env` defaults
fn parse_args<I, T>(args: I) -> Cli
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    // A missing .env is fine
    let _ = dotenvy::dotenv();
    Cli::parse_from(args)
}

fn init_logging(config: &LoggingConfig, verbose: bool) {
    let log_level = if verbose { "debug" } else { config.level.as_str() };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    // stdout belongs to the console exporter
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    if config.format == "json" {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Build the console pipeline and install it as the active processor set
fn install_console_pipeline(config: &Config) -> anyhow::Result<ProcessorGuard> {
    let console: Arc<dyn TracingExporter> = Arc::new(ConsoleExporter::new(config.console.clone()));
    let guard = BatchTraceProcessor::new(vec![console], config.processor.clone())?.into_guard();

    set_tracing_disabled(config.tracing_disabled);
    set_trace_processors(vec![guard.processor()]);
    Ok(guard)
}

fn run_demo(config: &Config, prompt: String, model: String, agent: String) -> anyhow::Result<()> {
    info!("Simulating run of agent {} on {}", agent, model);

    let guard = install_console_pipeline(config)?;
    let final_output = demo::run(&DemoRun {
        agent,
        model,
        prompt,
        ..DemoRun::default()
    });

    // Flush the trace before printing the answer
    drop(guard);
    println!();
    println!("{final_output}");
    Ok(())
}

fn run_replay(config: &Config, file: &Path) -> anyhow::Result<()> {
    let items = read_items(file)?;
    info!("Replaying {} trace items from {}", items.len(), file.display());

    let guard = install_console_pipeline(config)?;
    for item in &items {
        match item {
            TraceItem::Trace(trace) => emit_trace_start(trace),
            TraceItem::Span(span) => emit_span_end(span),
        }
    }

    let processor = guard.processor();
    drop(guard);

    let stats = processor.stats();
    info!(
        "Replay finished: {} exported, {} dropped, {} export failures",
        stats.exported_items, stats.dropped, stats.export_failures
    );
    Ok(())
}

fn run_render(config: &Config, file: &Path) -> anyhow::Result<()> {
    let items = read_items(file)?;
    let console = ConsoleExporter::new(config.console.clone());

    match console.export(&items) {
        Err(e @ Error::MalformedPayload { .. }) => {
            warn!("{}", e);
            Ok(())
        }
        other => Ok(other?),
    }
}

fn run_config(config: &Config) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(config)?);
    Ok(())
}

fn read_items(file: &Path) -> anyhow::Result<Vec<TraceItem>> {
    let reader = BufReader::new(
        File::open(file).with_context(|| format!("failed to open {}", file.display()))?,
    );
    read_jsonl(reader).with_context(|| format!("failed to read {}", file.display()))
}

fn generate_completions(shell: clap_complete::Shell) {
    use clap::CommandFactory;
    use clap_complete::generate;
    use std::io;

    let mut cmd = Cli::command();
    generate(shell, &mut cmd, "tracesink", &mut io::stdout());
}
