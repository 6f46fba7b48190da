//! CLI for the workload log scanner
//!
//! Run `logscan --help` for usage information.

// CLI binaries legitimately need println! for user output
#![allow(clippy::disallowed_macros)]

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use logscan::{
    format_report_text, health, AggregationMode, LogSnapshot, PatternCatalog, RunArtifacts,
    ScanConfig, ScanRunner,
};

#[derive(Parser)]
#[command(name = "logscan")]
#[command(about = "Scan workload container logs for known failure patterns")]
#[command(version)]
struct Cli {
    /// Snapshot directory containing manifest.json and per-pod logs
    snapshot: PathBuf,

    /// Pattern catalog (JSON or YAML); defaults to the built-in catalog
    #[arg(long, env = "LOGSCAN_CATALOG")]
    catalog: Option<PathBuf>,

    /// Scanner config file (JSON or YAML)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Issue granularity: per-pattern, per-category
    #[arg(short, long)]
    aggregation: Option<AggregationMode>,

    /// Category to scan (repeatable); defaults to every catalog category plus anomaly detection
    #[arg(short, long = "category")]
    categories: Vec<String>,

    /// Output format: json, text
    #[arg(short, long, default_value = "text")]
    format: OutputFormat,

    /// Keep per-task scan results in this directory
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Clone, Copy, Default, clap::ValueEnum)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cli.verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("warn")
        }
    });

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(filter)
        .init();

    let config = load_config(&cli)?;
    let catalog = match &cli.catalog {
        Some(path) => PatternCatalog::from_path(path),
        None => PatternCatalog::builtin(),
    };

    let snapshot = LogSnapshot::load(&cli.snapshot)
        .with_context(|| format!("Failed to load snapshot {}", cli.snapshot.display()))?;
    let runner = ScanRunner::new(catalog, config, snapshot.workload.clone());
    if let Some(e) = runner.catalog_error() {
        eprintln!("{} {e}", "⚠️  Pattern catalog unavailable:".yellow());
    }
    let categories = if cli.categories.is_empty() {
        runner.default_categories()
    } else {
        cli.categories.clone()
    };

    let results = runner.run_all(&categories, &snapshot.records);
    let score = health::score_all(&results);
    info!(tasks = results.len(), health = score, "Scan complete");

    let mut artifacts = match &cli.output_dir {
        Some(dir) => RunArtifacts::open(dir)
            .with_context(|| format!("Failed to prepare {}", dir.display()))?,
        None => RunArtifacts::temporary().context("Failed to create a temporary result directory")?,
    };
    for result in &results {
        artifacts
            .write(result)
            .with_context(|| format!("Failed to write result for task {}", result.task))?;
    }
    if cli.output_dir.is_some() {
        artifacts.keep();
    }

    match cli.format {
        OutputFormat::Json => {
            let output = serde_json::json!({
                "workload": snapshot.workload,
                "results": results,
                "health": score,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Text => {
            print!("{}", format_report_text(&snapshot.workload, &results, score));
            if score < 1.0 {
                println!("{}", "✗ Workload unhealthy".red().bold());
            } else {
                println!("{}", "✓ Workload healthy".green().bold());
            }
            if cli.output_dir.is_some() {
                println!(
                    "{}",
                    format!("📁 Results kept in {}", artifacts.dir().display()).dimmed()
                );
            }
        }
    }

    Ok(())
}

fn load_config(cli: &Cli) -> Result<ScanConfig> {
    let base = match &cli.config {
        Some(path) => ScanConfig::from_path(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => ScanConfig::default(),
    };
    let mut config = base.with_env_overrides();
    if let Some(mode) = cli.aggregation {
        config.aggregation = mode;
    }
    Ok(config)
}
