use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{error, info};

use esc_dataset::config::Config;
use esc_dataset::constants::SONGS_CLEANED_RELATION;
use esc_dataset::pipeline::{sinks_from_config, write_run_artifacts, Pipeline, PipelineReport};
use esc_dataset::table::csv_io::write_table_to_path;
use esc_dataset::{logging, metrics};

#[derive(Parser)]
#[command(name = "esc_dataset")]
#[command(about = "Song-contest results cleaning and dataset assembly")]
#[command(version = "0.1.0")]
struct Cli {
    /// Config file (defaults to ESC_CONFIG, then config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run every stage and persist all relations
    Run {
        /// Skip the SQLite sink
        #[arg(long)]
        no_db: bool,
    },
    /// Clean the song sheet only and write it as CSV
    Clean {
        /// Output file (defaults to <output dir>/songs_cleaned.csv)
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Build the dataset without persisting anything
    Check,
}

fn load_config(path: Option<PathBuf>) -> anyhow::Result<Config> {
    let config = match path {
        Some(path) => Config::load_from(&path)
            .with_context(|| format!("loading config from {}", path.display()))?
            .with_env_overrides(),
        None => Config::load().context("loading configuration")?,
    };
    Ok(config)
}

fn print_report(report: &PipelineReport) {
    println!("\n📊 Pipeline Results (run {}):", report.run_id);
    for relation in &report.relations {
        println!(
            "   {:<28} {:>6} rows  {:>3} cols  {}",
            relation.name,
            relation.rows,
            relation.columns,
            &relation.sha256[..12]
        );
    }
    println!("   Total rows: {}", report.total_rows());
    println!("   Sinks: {}", report.sinks.join(", "));
    if !report.skipped.is_empty() {
        println!("\n⚠️  Skipped sources:");
        for skipped in &report.skipped {
            println!("   - {} {} ({}): {}", skipped.year, skipped.kind, skipped.file, skipped.reason);
        }
    }
}

fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let _log_guard = logging::init_logging();
    metrics::init_metrics();

    let cli = Cli::parse();
    let mut config = load_config(cli.config)?;
    info!(?config, "configuration loaded");

    match cli.command {
        Commands::Run { no_db } => {
            println!("🚀 Running full pipeline...");
            if no_db {
                config.database.enabled = false;
            }
            let sinks = sinks_from_config(&config);
            let pipeline = Pipeline::new(config);
            match pipeline.run(&sinks) {
                Ok(report) => {
                    write_run_artifacts(&report, &pipeline.config().output.dir)
                        .context("writing run report")?;
                    print_report(&report);
                    println!("\n✅ Pipeline completed successfully!");
                }
                Err(e) => {
                    error!("Pipeline failed: {}", e);
                    println!("❌ Pipeline failed: {}", e);
                    return Err(e.into());
                }
            }
        }
        Commands::Clean { out } => {
            println!("🔨 Cleaning song sheet...");
            let out = out.unwrap_or_else(|| config.output.dir.join(format!("{SONGS_CLEANED_RELATION}.csv")));
            let pipeline = Pipeline::new(config);
            let cleaned = pipeline.clean().context("cleaning song sheet")?;
            if let Some(parent) = out.parent() {
                std::fs::create_dir_all(parent)?;
            }
            write_table_to_path(&cleaned, &out)?;
            println!("✅ {} rows written to {}", cleaned.len(), out.display());
        }
        Commands::Check => {
            println!("🔍 Checking sources...");
            let pipeline = Pipeline::new(config);
            let dataset = pipeline.build().context("building dataset")?;
            println!("   Overview rows: {}", dataset.overview.len());
            println!("   Feature rows: {}", dataset.features.len());
            println!("   Score rows: {}", dataset.scores.len());
            println!("   Cleaned per-year tables: {}", dataset.cleaned_years.len());
            if dataset.skipped.is_empty() {
                println!("✅ All sources match their schemas");
            } else {
                println!("⚠️  {} sources would be skipped:", dataset.skipped.len());
                for skipped in &dataset.skipped {
                    println!("   - {} {}: {}", skipped.year, skipped.kind, skipped.reason);
                }
            }
        }
    }
    Ok(())
}
