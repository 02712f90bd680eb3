//! Pawan CLI entry point.
//!
//! One subcommand, `run` (spec.md §6): load a config, run the agent loop
//! once against a query, and write the trace dump to `--log-dir-path`.

use clap::Parser;
use owo_colors::OwoColorize;
use pawan::agent::provider::OllamaProvider;
use pawan::agent::AgentLoop;
use pawan::config::PawanConfig;
use pawan::{PawanError, Result};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "pawan")]
#[command(author, version, about = "Pawan (पवन) - a coding agent runtime")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose (debug-level) logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Override the configured model.
    #[arg(long, global = true)]
    model: Option<String>,

    /// Dry-run mode: mutating tools log their would-be action instead of acting.
    #[arg(long, global = true)]
    dry_run: bool,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Run the agent loop once against a query.
    Run {
        /// Path to a TOML config file.
        #[arg(long)]
        config_path: PathBuf,

        /// The task to accomplish.
        #[arg(long)]
        query: String,

        /// Directory to write the trace dump into.
        #[arg(long)]
        log_dir_path: PathBuf,

        /// Workspace root (defaults to the current directory).
        #[arg(long)]
        working_dir: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("{} {}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let Commands::Run { config_path, query, log_dir_path, working_dir } = cli.command;

    let mut config = PawanConfig::load(Some(&config_path))?;
    if let Some(model) = cli.model {
        config.model = model;
    }
    if cli.dry_run {
        config.dry_run = true;
    }

    let workspace_root = working_dir.unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));

    if cli.verbose {
        println!("{} {}", "Workspace:".cyan().bold(), workspace_root.display());
        println!("{} {}", "Model:".cyan().bold(), config.model);
        if config.dry_run {
            println!("{}", "Dry-run mode enabled".yellow());
        }
    }

    let provider = Box::new(OllamaProvider::new(
        config.ollama_url.clone(),
        config.model.clone(),
        config.temperature,
        config.top_p,
    ));

    let agent_loop = AgentLoop::new(config, workspace_root, provider);

    println!("{} {}", "Task:".green().bold(), query);
    println!("{}", "─".repeat(40).dimmed());

    let outcome = agent_loop.run(&query).await?;

    println!("{}", "─".repeat(40).dimmed());
    println!("{} {:?}", "Terminated:".cyan().bold(), outcome.terminate_reason);
    if let Some(result) = &outcome.final_result {
        println!("{} {}", "Result:".green().bold(), result);
    }
    println!("{} {}", "Turns:".dimmed(), outcome.turn_count);

    std::fs::create_dir_all(&log_dir_path).map_err(PawanError::Io)?;
    let trace_path = log_dir_path.join("pawan_trace.json");
    let trace_json = serde_json::to_string_pretty(&outcome.trace).map_err(|e| PawanError::Parse(e.to_string()))?;
    std::fs::write(&trace_path, trace_json).map_err(PawanError::Io)?;

    Ok(())
}
