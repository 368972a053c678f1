//! Load test bottleneck analysis CLI
//!
//! Analyses a load-test result table (and optional infrastructure
//! utilization table), reports bottlenecks and capacity risks, and manages
//! stored baselines for run-to-run comparison.

mod commands;
mod config;
mod output;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use commands::{analyze, baseline};
use output::OutputFormat;

/// Load test bottleneck detection and classification
#[derive(Parser)]
#[command(name = "loadscope")]
#[command(author, version, about = "Load test bottleneck detection and classification", long_about = None)]
pub struct Cli {
    /// Output format (defaults to the user config, then table)
    #[arg(long, short, global = true)]
    pub format: Option<OutputFormat>,

    /// Log record format on stderr
    #[arg(long, global = true, default_value = "text")]
    pub log_format: LogFormat,

    /// Directory holding stored baselines
    #[arg(long, global = true, env = "LOADSCOPE_BASELINE_DIR")]
    pub baseline_dir: Option<PathBuf>,

    /// Enable verbose output
    #[arg(long, short, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum LogFormat {
    /// Compact human-readable records
    #[default]
    Text,
    /// One JSON object per record
    Json,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Analyse a load test run
    Analyze(AnalyzeArgs),

    /// Inspect stored baselines
    #[command(subcommand)]
    Baseline(BaselineCommands),
}

#[derive(Args)]
pub struct AnalyzeArgs {
    /// Request-level result table (JTL or canonical CSV)
    #[arg(long, short)]
    pub results: PathBuf,

    /// Infrastructure utilization table
    #[arg(long, short)]
    pub infra: Option<PathBuf>,

    /// SLA table (JSON)
    #[arg(long, short)]
    pub sla: PathBuf,

    /// Analysis configuration file (toml, json or yaml)
    #[arg(long, short)]
    pub config: Option<PathBuf>,

    /// Identifier attached to log records and saved baselines
    #[arg(long)]
    pub run_id: Option<String>,

    /// Stored run whose baselines replace the computed ones
    #[arg(long)]
    pub baseline_run: Option<String>,

    /// Save this run's baselines under the given id
    #[arg(long)]
    pub save_baseline: Option<String>,

    /// Write the full JSON report to a file
    #[arg(long, short)]
    pub output: Option<PathBuf>,

    /// Write Prometheus text exposition to a file
    #[arg(long)]
    pub metrics_out: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum BaselineCommands {
    /// List stored baselines
    List,

    /// Show the baselines of one stored run
    Show {
        /// Stored run id
        run_id: String,
    },
}

fn init_tracing(format: LogFormat, verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let registry = tracing_subscriber::registry().with(filter);

    // stdout is reserved for the report
    match format {
        LogFormat::Json => registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init(),
        LogFormat::Text => registry
            .with(fmt::layer().compact().with_writer(std::io::stderr))
            .init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format, cli.verbose);

    let user_config = config::Config::load()?;
    let format = cli.format.or(user_config.default_format).unwrap_or_default();
    let baseline_dir = user_config.baseline_dir(cli.baseline_dir)?;

    match cli.command {
        Commands::Analyze(args) => {
            let succeeded = analyze::run_analysis(args, &baseline_dir, format).await?;
            if !succeeded {
                std::process::exit(1);
            }
        }
        Commands::Baseline(baseline_cmd) => match baseline_cmd {
            BaselineCommands::List => {
                baseline::list_baselines(&baseline_dir, format)?;
            }
            BaselineCommands::Show { run_id } => {
                baseline::show_baseline(&baseline_dir, &run_id, format)?;
            }
        },
    }

    Ok(())
}
