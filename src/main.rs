//! Ranklake CLI
//!
//! Command-line interface for the domain ranking lake:
//! - Download daily snapshots
//! - Convert them to Parquet
//! - Extract per-domain yearly aggregates
//! - Run ad-hoc queries over the `raw` view

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use duckdb::arrow::util::pretty::print_batches;
use ranklake::config::{generate_default_config, Config};
use ranklake::lake::LakeController;
use ranklake::store::{DateRange, SnapshotDate};
use serde::Serialize;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "ranklake")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Daily domain ranking snapshots as a queryable Parquet lake")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file (default: ~/.config/ranklake/config.toml or ./ranklake.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Lake root, overriding the config
    #[arg(long, global = true)]
    pub root: Option<PathBuf>,

    /// Shard output directory, overriding the config
    #[arg(long, global = true)]
    pub output: Option<PathBuf>,

    /// Print summaries as JSON
    #[arg(long, global = true)]
    pub json: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Fetch missing snapshots for an inclusive date range
    Download {
        /// First date (YYYY-MM-DD)
        from: SnapshotDate,
        /// Last date (YYYY-MM-DD)
        to: SnapshotDate,
        /// Maximum simultaneous fetches
        #[arg(short = 'j', long)]
        max_in_flight: Option<usize>,
    },

    /// Convert raw snapshots in an inclusive date range to Parquet
    Convert {
        /// First date (YYYY-MM-DD)
        from: SnapshotDate,
        /// Last date (YYYY-MM-DD)
        to: SnapshotDate,
    },

    /// Write per-domain yearly aggregate shards
    Extract {
        /// Target domains
        #[arg(required = true)]
        domains: Vec<String>,
        /// First year
        #[arg(long)]
        from_year: i32,
        /// Last year (default: same as --from-year)
        #[arg(long)]
        to_year: Option<i32>,
    },

    /// Run a SQL query against the `raw` view
    Query {
        /// SQL text
        sql: String,
    },

    /// Generate default config file
    Config {
        /// Output path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Config::load_with_env(path)?,
        None => Config::load_default(),
    };
    if let Some(root) = cli.root.clone() {
        config.lake.root = root;
    }
    if let Some(output) = cli.output.clone() {
        config.lake.output_dir = output;
    }

    init_logging(&config);
    tracing::info!("Ranklake v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Commands::Download {
            from,
            to,
            max_in_flight,
        } => {
            if let Some(n) = max_in_flight {
                config.download.max_in_flight = n;
            }
            let lake = open_lake(&config)?;
            let summary = lake.download(date_range(from, to)?).await;
            report(cli.json, &summary, &summary.to_string())?;
        }

        Commands::Convert { from, to } => {
            let lake = open_lake(&config)?;
            let summary = lake.to_parquet(date_range(from, to)?);
            report(cli.json, &summary, &summary.to_string())?;
        }

        Commands::Extract {
            domains,
            from_year,
            to_year,
        } => {
            let mut lake = open_lake(&config)?;
            let years = from_year..=to_year.unwrap_or(from_year);
            let summary = lake.extract_all(domains.as_slice(), years)?;
            report(cli.json, &summary, &summary.to_string())?;
            lake.close()?;
        }

        Commands::Query { sql } => {
            let mut lake = open_lake(&config)?;
            let batches = lake.query(&sql)?;
            print_batches(&batches)?;
            lake.close()?;
        }

        Commands::Config { output } => {
            let content = generate_default_config();
            match output {
                Some(path) => {
                    std::fs::write(&path, content)
                        .with_context(|| format!("failed to write {:?}", path))?;
                    println!("Config written to {:?}", path);
                }
                None => print!("{}", content),
            }
        }
    }

    Ok(())
}

fn init_logging(config: &Config) {
    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG")
            .unwrap_or_else(|_| format!("ranklake={}", config.logging.level)),
    );

    if config.logging.format == "json" {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

fn open_lake(config: &Config) -> anyhow::Result<LakeController> {
    let lake = LakeController::create(&config.lake.root, &config.lake.output_dir, config)
        .with_context(|| format!("failed to open lake at {:?}", config.lake.root))?;
    Ok(lake)
}

fn date_range(from: SnapshotDate, to: SnapshotDate) -> anyhow::Result<DateRange> {
    if to < from {
        bail!("end date {} is before start date {}", to, from);
    }
    Ok(DateRange::new(from, to))
}

fn report<T: Serialize>(json: bool, summary: &T, text: &str) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(summary)?);
    } else {
        println!("{}", text);
    }
    Ok(())
}
